//! Demo conversation: pick a name, rate your mood, trade jokes

use chatlayer::{BotError, ChatBot, Context, Event, EventKind, HandlerResult, Reaction, ANY_TEXT};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;

const BANNED_NAME: &str = "SomeBadGuy";

#[derive(Clone)]
pub struct JokeService {
    bot: ChatBot,
    jokes: Arc<Mutex<Vec<String>>>,
}

impl JokeService {
    pub fn new(bot: ChatBot) -> Self {
        let jokes = vec![
            "There are 10 kinds of people: those who understand binary and those who don't.".to_string(),
            "A SQL query walks into a bar, goes up to two tables and asks: may I join you?".to_string(),
            "The borrow checker walks into a bar. The bar is still borrowed.".to_string(),
        ];
        Self {
            bot,
            jokes: Arc::new(Mutex::new(jokes)),
        }
    }

    /// Put the entry points on the default layer
    pub fn register(&self) {
        self.bot.register_command("/start", self.start());
        self.bot.register_command("/help", self.help("commands"));
        self.bot.register_command("/slow", self.slow_joke());
        self.bot.register_command("/whoami", self.whoami());

        // debug builds keep the built-in JSON echo for unknown events
        if !self.bot.settings().debug {
            self.bot.register_default_handler(self.fallback());
        }
    }

    fn random_joke(&self) -> String {
        let jokes = self.jokes.lock();
        let pick = chrono::Utc::now().timestamp_subsec_nanos() as usize % jokes.len().max(1);
        jokes.get(pick).cloned().unwrap_or_default()
    }

    fn start(&self) -> Reaction {
        let this = self.clone();
        Reaction::new(move |_ctx, event| this.clone().on_start(event))
    }

    async fn on_start(self, event: Event) -> HandlerResult {
        let mut layer = self.bot.new_layer();
        layer.add_text("Hi! Type or choose your name");
        for name in ["John", "Mike", "Bob"] {
            layer.register_ibutton(name, self.process_name());
        }
        layer.register_text(BANNED_NAME, self.banned_name());
        layer.register_text(ANY_TEXT, self.process_name());

        self.bot.send_msg(event.chat_id, layer).await?;
        Ok(())
    }

    fn help(&self, topic: &'static str) -> Reaction {
        let this = self.clone();
        Reaction::new(move |_ctx, event| this.clone().on_help(event, topic))
    }

    async fn on_help(self, event: Event, topic: &'static str) -> HandlerResult {
        let mut layer = self.bot.new_layer();
        if topic == "jokes" {
            layer.add_text("Just type the joke and send it.");
            layer.add_text("Is it obvious?");
        } else {
            layer.add_text("Welcome to help!");
            layer.add_text(format!("You asked about: {topic}"));
            layer.add_text("/start talks to you, /slow thinks hard, /whoami shows your profile");
        }
        layer.register_ibutton("Start", self.start());

        self.bot.send_msg(event.chat_id, layer).await?;
        Ok(())
    }

    fn process_name(&self) -> Reaction {
        let this = self.clone();
        Reaction::new(move |_ctx, event| this.clone().on_name(event))
    }

    async fn on_name(self, event: Event) -> HandlerResult {
        let name = name_from(&event)?;
        if name == BANNED_NAME {
            return self.on_banned(event).await;
        }

        let mut layer = self.bot.new_layer();
        layer.add_text(format!("Hello, {}", escape_html(&name)));
        layer.add_text("How are you? From 1 to 5");
        layer.set_row_mode(true);
        for score in 1..=5u8 {
            layer.register_ibutton(score.to_string(), self.mood(name.clone(), score));
        }

        self.bot.send_msg(event.chat_id, layer).await?;
        Ok(())
    }

    fn banned_name(&self) -> Reaction {
        let this = self.clone();
        Reaction::new(move |_ctx, event| this.clone().on_banned(event))
    }

    async fn on_banned(self, event: Event) -> HandlerResult {
        let name = name_from(&event)?;
        self.bot
            .send_text(event.chat_id, format!("Sorry, but you are banned, {}", escape_html(&name)))
            .await?;
        self.bot
            .retry_last_layer(&event, "Choose another name")
            .await?;
        Ok(())
    }

    fn mood(&self, name: String, score: u8) -> Reaction {
        let this = self.clone();
        Reaction::new(move |_ctx, event| this.clone().on_mood(event, name.clone(), score))
    }

    async fn on_mood(self, event: Event, name: String, score: u8) -> HandlerResult {
        let mut layer = self.bot.new_layer();
        match score {
            1 | 2 => {
                layer.add_text(format!("Sorry, {}!", escape_html(&name)));
                layer.add_text("I will send you a joke:");
                layer.add_text(format!("<code>{}</code>", escape_html(&self.random_joke())));
                layer.add_text("Do you want to see more?");
                layer.register_ibutton("Yes", self.mood(name, score));
                layer.register_ibutton("No", self.start());
            }
            3 | 4 => {
                layer.add_text(format!("Ok, {}!", escape_html(&name)));
                layer.add_text("I hope you will feel better");
                layer.register_ibutton("Back", self.start());
            }
            _ => {
                layer.add_text(format!("Great, {}!", escape_html(&name)));
                layer.add_text("If you are in such a mood, type me a joke. Or just press \"Back\"");
                layer.register_ibutton("How to write jokes?", self.help("jokes"));
                layer.register_text(ANY_TEXT, self.capture_joke());
                layer.register_ibutton("Back", self.start());
            }
        }

        self.bot.send_msg(event.chat_id, layer).await?;
        Ok(())
    }

    fn capture_joke(&self) -> Reaction {
        let this = self.clone();
        Reaction::new(move |_ctx, event| this.clone().on_joke(event))
    }

    async fn on_joke(self, event: Event) -> HandlerResult {
        let joke = event.text.clone();
        let mut layer = self.bot.new_layer();
        layer.add_text("Aha-ha! That is a good joke:");
        layer.add_text(escape_html(&joke));
        layer.add_text("Let me save it?");
        layer.register_ibutton("Yes", self.save_joke(joke.clone()));
        layer.register_ibutton("No", self.start());
        layer.register_ibutton_switch("Share", joke, self.start());

        self.bot.send_msg(event.chat_id, layer).await?;
        Ok(())
    }

    fn save_joke(&self, joke: String) -> Reaction {
        let this = self.clone();
        Reaction::new(move |_ctx, event| this.clone().on_save(event, joke.clone()))
    }

    async fn on_save(self, event: Event, joke: String) -> HandlerResult {
        let total = {
            let mut jokes = self.jokes.lock();
            jokes.push(joke);
            jokes.len()
        };
        tracing::info!(total, "joke saved");

        let mut layer = self.bot.new_layer();
        layer.add_text("Ok, I saved it. Thank you!");
        layer.register_ibutton("Back", self.start());
        self.bot.send_msg(event.chat_id, layer).await?;
        Ok(())
    }

    fn slow_joke(&self) -> Reaction {
        let this = self.clone();
        Reaction::new(move |ctx: Context, event| this.clone().on_slow(ctx, event))
    }

    async fn on_slow(self, ctx: Context, event: Event) -> HandlerResult {
        let screens = ["Thinking.", "Thinking..", "Thinking..."]
            .iter()
            .map(|s| s.to_string())
            .collect();
        let loader = self.bot.loader_button(event.chat_id, screens);

        tokio::select! {
            _ = ctx.cancellation().cancelled() => {}
            _ = tokio::time::sleep(Duration::from_secs(5)) => {}
        }
        loader.cancel();

        self.bot
            .send_text(event.chat_id, escape_html(&self.random_joke()))
            .await?;
        Ok(())
    }

    fn whoami(&self) -> Reaction {
        let this = self.clone();
        Reaction::new(move |_ctx, event| this.clone().on_whoami(event))
    }

    async fn on_whoami(self, event: Event) -> HandlerResult {
        let text = format!(
            "You are {} (@{}), talking to @{}",
            escape_html(&event.full_name()),
            escape_html(&event.username),
            self.bot.self_user_name()
        );
        self.bot.send_text(event.chat_id, text).await?;
        Ok(())
    }

    fn fallback(&self) -> Reaction {
        let this = self.clone();
        Reaction::new(move |_ctx, event| this.clone().on_unknown(event))
    }

    async fn on_unknown(self, event: Event) -> HandlerResult {
        if let (EventKind::Media, Some(media)) = (event.kind, &event.media) {
            let url = self.bot.file_url(&media.file_id).await?;
            self.bot
                .send_text(event.chat_id, format!("Got your {:?}: {url}", media.kind))
                .await?;
            return Ok(());
        }
        self.on_help(event, "unknown action").await
    }
}

/// Name from a pressed button or from typed text
fn name_from(event: &Event) -> Result<String, BotError> {
    let name = match event.kind {
        EventKind::InlineButton => event.button_text.trim(),
        _ => event.text.trim(),
    };
    if name.is_empty() {
        return Err(BotError::handler("can't get a name from the event"));
    }
    Ok(name.to_string())
}

/// Escape user text for HTML parse mode
fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}
