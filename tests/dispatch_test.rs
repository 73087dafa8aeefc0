//! End-to-end dispatch through the bot facade

mod common;

use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use chatlayer::infrastructure::storage::MemoryLayerStore;
use chatlayer::{
    BotError, ChatBot, Context, Event, HandlerLayer, LayerStore, Reaction, StartupError, ANY_TEXT,
};
use common::{bot, callback_update, command_update, text_update, MockTransport};

fn recorder(log: &Arc<Mutex<Vec<String>>>, tag: &'static str) -> Reaction {
    let log = log.clone();
    Reaction::new(move |_ctx, _event| {
        let log = log.clone();
        async move {
            log.lock().push(tag.to_string());
            Ok(())
        }
    })
}

fn error_sink(bot: &ChatBot) -> Arc<Mutex<Vec<String>>> {
    let errors = Arc::new(Mutex::new(Vec::new()));
    let sink = errors.clone();
    bot.register_error_handler(move |_ctx, _event, err: BotError| {
        let sink = sink.clone();
        async move {
            sink.lock().push(err.to_string());
        }
    });
    errors
}

#[tokio::test]
async fn test_command_then_inline_button() {
    let (bot, transport, _feed) = bot();
    bot.register_command("/start", |ctx: Context, event: Event| async move {
        let bot = ctx.bot();
        let mut layer = bot.new_layer();
        layer.add_text("Welcome");
        layer.register_ibutton("Next", |ctx: Context, event: Event| async move {
            ctx.bot().send_text(event.chat_id, "You pressed Next").await?;
            Ok(())
        });
        bot.send_msg(event.chat_id, layer).await?;
        Ok(())
    });

    bot.handle_update(command_update(1, 42, "/start")).await;
    assert_eq!(transport.texts(), vec!["Welcome"]);
    assert_eq!(bot.layer_store().pending().await, 1);

    let buttons = transport.last_inline_buttons();
    assert_eq!(buttons.len(), 1);
    let (label, data) = &buttons[0];
    assert_eq!(label, "Next");

    bot.handle_update(callback_update(2, 42, label, data)).await;
    assert_eq!(transport.texts(), vec!["Welcome", "You pressed Next"]);
    assert_eq!(bot.layer_store().pending().await, 0);

    // the layer was one-shot: pressing again reaches the quiet default
    bot.handle_update(callback_update(3, 42, label, data)).await;
    assert_eq!(transport.texts().len(), 2);
}

#[tokio::test]
async fn test_pending_layer_is_scoped_to_its_chat() {
    let (bot, _transport, _feed) = bot();
    let log = Arc::new(Mutex::new(Vec::new()));
    bot.register_text(ANY_TEXT, recorder(&log, "default"));

    let mut layer = bot.new_layer();
    layer.register_text(ANY_TEXT, recorder(&log, "layer"));
    bot.send_msg(1, layer).await.unwrap();

    bot.handle_update(text_update(1, 2, "hi")).await;
    bot.handle_update(text_update(2, 1, "hi")).await;
    bot.handle_update(text_update(3, 1, "hi")).await;

    assert_eq!(*log.lock(), vec!["default", "layer", "default"]);
}

#[tokio::test]
async fn test_chat_layer_default_beats_default_layer_match() {
    let (bot, _transport, _feed) = bot();
    let log = Arc::new(Mutex::new(Vec::new()));
    bot.register_command("/help", recorder(&log, "global-help"));

    let mut layer = bot.new_layer();
    layer.register_default_handler(recorder(&log, "layer-default"));
    bot.send_msg(5, layer).await.unwrap();

    bot.handle_update(command_update(1, 5, "/help")).await;
    bot.handle_update(command_update(2, 5, "/help")).await;

    assert_eq!(*log.lock(), vec!["layer-default", "global-help"]);
}

#[tokio::test]
async fn test_expired_layer_falls_back_to_default() {
    let (bot, _transport, _feed) = bot();
    let log = Arc::new(Mutex::new(Vec::new()));
    bot.register_text(ANY_TEXT, recorder(&log, "default"));

    let mut stale = HandlerLayer::new(chrono::Utc::now() - chrono::Duration::seconds(1));
    stale.register_text(ANY_TEXT, recorder(&log, "stale"));
    bot.layer_store().put(3, Arc::new(stale)).await;

    bot.handle_update(text_update(1, 3, "anyone?")).await;
    assert_eq!(*log.lock(), vec!["default"]);
}

/// Layer store that counts how often a pending layer is consumed
#[derive(Default)]
struct CountingStore {
    inner: MemoryLayerStore,
    takes: AtomicUsize,
}

#[async_trait]
impl LayerStore for CountingStore {
    async fn put(&self, chat_id: i64, layer: Arc<HandlerLayer>) {
        self.inner.put(chat_id, layer).await
    }

    async fn take_and_clear(&self, chat_id: i64) -> Option<Arc<HandlerLayer>> {
        self.takes.fetch_add(1, Ordering::SeqCst);
        self.inner.take_and_clear(chat_id).await
    }

    async fn sweep(&self) -> usize {
        self.inner.sweep().await
    }

    async fn pending(&self) -> usize {
        self.inner.pending().await
    }
}

#[tokio::test]
async fn test_simultaneous_events_for_one_chat_run_once() {
    let (transport, _feed) = MockTransport::new();
    let store = Arc::new(CountingStore::default());
    let bot = ChatBot::builder(transport).layer_store(store.clone()).build();

    let runs = Arc::new(AtomicUsize::new(0));
    let counter = runs.clone();
    let mut layer = bot.new_layer();
    layer.register_text(ANY_TEXT, move |_ctx, _event| {
        let counter = counter.clone();
        async move {
            counter.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(50)).await;
            Ok(())
        }
    });
    bot.send_msg(8, layer).await.unwrap();

    tokio::join!(
        bot.handle_update(text_update(1, 8, "one")),
        bot.handle_update(text_update(2, 8, "two")),
    );

    assert_eq!(runs.load(Ordering::SeqCst), 1);
    assert_eq!(store.takes.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_at_most_one_reaction_in_flight_per_chat() {
    let (bot, _transport, _feed) = bot();
    let running = Arc::new(AtomicUsize::new(0));
    let peak = Arc::new(AtomicUsize::new(0));

    let (running_in, peak_in) = (running.clone(), peak.clone());
    bot.register_text(ANY_TEXT, move |_ctx, _event| {
        let (running, peak) = (running_in.clone(), peak_in.clone());
        async move {
            let now = running.fetch_add(1, Ordering::SeqCst) + 1;
            peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(10)).await;
            running.fetch_sub(1, Ordering::SeqCst);
            Ok(())
        }
    });

    let updates = (0..10).map(|i| bot.handle_update(text_update(i, 11, "spam")));
    futures::future::join_all(updates).await;

    assert_eq!(peak.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_different_chats_run_in_parallel() {
    let (bot, _transport, _feed) = bot();
    let running = Arc::new(AtomicUsize::new(0));
    let peak = Arc::new(AtomicUsize::new(0));

    let (running_in, peak_in) = (running.clone(), peak.clone());
    bot.register_text(ANY_TEXT, move |_ctx, _event| {
        let (running, peak) = (running_in.clone(), peak_in.clone());
        async move {
            let now = running.fetch_add(1, Ordering::SeqCst) + 1;
            peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(50)).await;
            running.fetch_sub(1, Ordering::SeqCst);
            Ok(())
        }
    });

    tokio::join!(
        bot.handle_update(text_update(1, 21, "a")),
        bot.handle_update(text_update(2, 22, "b")),
    );

    assert_eq!(peak.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_retry_last_layer_from_a_reaction() {
    let (bot, transport, _feed) = bot();
    bot.register_command("/pick", |ctx: Context, event: Event| async move {
        let bot = ctx.bot();
        let mut layer = bot.new_layer();
        layer.add_text("Pick a name");
        layer.register_ibutton("John", |_ctx, _event| async { Ok(()) });
        layer.register_text("Voldemort", |ctx: Context, event: Event| async move {
            ctx.bot().retry_last_layer(&event, "Choose another name").await?;
            Ok(())
        });
        bot.send_msg(event.chat_id, layer).await?;
        Ok(())
    });

    bot.handle_update(command_update(1, 4, "/pick")).await;
    let first_buttons = transport.last_inline_buttons();

    bot.handle_update(text_update(2, 4, "Voldemort")).await;
    assert_eq!(transport.texts(), vec!["Pick a name", "Choose another name"]);
    assert_eq!(transport.last_inline_buttons(), first_buttons);
    assert_eq!(bot.layer_store().pending().await, 1);

    // the retried layer answers again
    bot.handle_update(text_update(3, 4, "Voldemort")).await;
    assert_eq!(transport.texts().len(), 3);
}

#[tokio::test]
async fn test_retry_with_empty_text_keeps_original() {
    let (bot, transport, _feed) = bot();
    let mut layer = bot.new_layer();
    layer.add_text("Original");
    layer.register_text(ANY_TEXT, |ctx: Context, event: Event| async move {
        ctx.bot().retry_last_layer(&event, "").await?;
        Ok(())
    });
    bot.send_msg(6, layer).await.unwrap();

    bot.handle_update(text_update(1, 6, "again")).await;
    assert_eq!(transport.texts(), vec!["Original", "Original"]);
}

#[tokio::test]
async fn test_errors_reach_the_error_handler() {
    let (bot, _transport, _feed) = bot();
    let errors = error_sink(&bot);
    bot.register_command("/fail", |_ctx, _event| async {
        Err(BotError::handler("boom"))
    });

    bot.handle_update(command_update(1, 9, "/fail")).await;
    bot.handle_update(chatlayer::Update {
        update_id: 2,
        ..Default::default()
    })
    .await;

    assert_eq!(*errors.lock(), vec!["Handler error: boom", "unparsed event"]);
}

#[tokio::test]
async fn test_panicking_reaction_is_reported_and_releases_chat() {
    let (bot, _transport, _feed) = bot();
    let errors = error_sink(&bot);
    let log = Arc::new(Mutex::new(Vec::new()));
    bot.register_command("/explode", |_ctx, _event| async { panic!("kaboom") });
    bot.register_command("/ping", recorder(&log, "pong"));

    bot.handle_update(command_update(1, 12, "/explode")).await;
    bot.handle_update(command_update(2, 12, "/ping")).await;

    let errors = errors.lock().clone();
    assert_eq!(errors.len(), 1);
    assert!(errors[0].contains("kaboom"));
    assert_eq!(*log.lock(), vec!["pong"]);
}

#[tokio::test]
async fn test_error_handler_retries_layer_after_panic() {
    let (bot, transport, _feed) = bot();
    bot.register_error_handler(|ctx: Context, event: Event, _err: BotError| async move {
        if let Err(e) = ctx.bot().retry_last_layer(&event, "Try again").await {
            panic!("retry failed: {e}");
        }
    });

    let mut layer = bot.new_layer();
    layer.add_text("Say something");
    layer.register_text(ANY_TEXT, |_ctx, _event| async { panic!("kaboom") });
    bot.send_msg(14, layer).await.unwrap();

    bot.handle_update(text_update(1, 14, "hi")).await;

    assert_eq!(transport.texts(), vec!["Say something", "Try again"]);
    assert_eq!(bot.layer_store().pending().await, 1);
}

#[tokio::test]
async fn test_middleware_registered_later_still_applies() {
    let (bot, _transport, _feed) = bot();
    let log = Arc::new(Mutex::new(Vec::new()));
    bot.register_command("/go", recorder(&log, "handler"));

    let seen = log.clone();
    bot.register_middleware(move |next: Reaction| {
        let seen = seen.clone();
        Reaction::new(move |ctx, event| {
            let seen = seen.clone();
            let next = next.clone();
            async move {
                seen.lock().push("before".to_string());
                next.call(ctx, event).await
            }
        })
    });

    bot.handle_update(command_update(1, 13, "/go")).await;
    assert_eq!(*log.lock(), vec!["before", "handler"]);
}

#[tokio::test]
async fn test_start_requires_handlers() {
    let (transport, _feed) = MockTransport::new();
    let bot = ChatBot::builder(transport).without_defaults().build();

    let err = bot.start(CancellationToken::new()).await.unwrap_err();
    assert!(matches!(
        err,
        BotError::Startup(StartupError::MissingErrorHandler)
    ));
}

#[tokio::test]
async fn test_start_consumes_feed_until_closed() {
    let (bot, _transport, feed) = bot();
    let log = Arc::new(Mutex::new(Vec::new()));
    bot.register_text(ANY_TEXT, recorder(&log, "seen"));

    for chat in 1..=3 {
        feed.send(text_update(chat, chat, "hello")).await.unwrap();
    }
    drop(feed);

    bot.start(CancellationToken::new()).await.unwrap();
    assert_eq!(log.lock().len(), 3);
}

#[tokio::test]
async fn test_cancel_stops_start() {
    let (bot, _transport, _feed) = bot();
    let cancel = CancellationToken::new();

    let handle = tokio::spawn({
        let bot = bot.clone();
        let cancel = cancel.clone();
        async move { bot.start(cancel).await }
    });

    tokio::time::sleep(Duration::from_millis(20)).await;
    cancel.cancel();

    let result = tokio::time::timeout(Duration::from_secs(1), handle).await;
    assert!(matches!(result, Ok(Ok(Ok(())))));
}

#[tokio::test]
async fn test_media_goes_to_default_reaction() {
    let (bot, transport, _feed) = bot();
    bot.register_text(ANY_TEXT, |_ctx, _event| async { Ok(()) });
    bot.register_default_handler(|ctx: Context, event: Event| async move {
        let media = event.media.clone().ok_or_else(|| BotError::handler("no media"))?;
        let url = ctx.bot().file_url(&media.file_id).await?;
        ctx.bot().send_text(event.chat_id, url).await?;
        Ok(())
    });

    let mut update = text_update(1, 14, "");
    if let Some(message) = update.message.as_mut() {
        message.text = None;
        message.voice = Some(chatlayer::domain::entities::FileRef {
            file_id: "voice-1".to_string(),
            ..Default::default()
        });
    }

    bot.handle_update(update).await;
    assert_eq!(transport.texts(), vec!["https://files.test/voice-1"]);
    assert_eq!(bot.self_user_name(), "mock_bot");
}
