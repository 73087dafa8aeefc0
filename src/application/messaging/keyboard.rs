//! Keyboard layout for outbound layers

use super::layer::HandlerLayer;
use crate::application::errors::BotError;
use crate::domain::entities::InlineKeyboardButton;
use crate::domain::traits::Keyboard;

/// Keyboard to attach when sending `layer`.
///
/// A layer renders either inline buttons or reply buttons; having both is an error.
pub fn render(layer: &HandlerLayer) -> Result<Option<Keyboard>, BotError> {
    let inline: Vec<InlineKeyboardButton> = layer
        .inline_buttons()
        .into_iter()
        .map(|button| button.to_markup())
        .collect();
    let reply: Vec<String> = layer.reply_buttons().into_iter().map(String::from).collect();

    match (inline.is_empty(), reply.is_empty()) {
        (false, false) => Err(BotError::MixedKeyboard),
        (false, true) => Ok(Some(Keyboard::Inline(inline_rows(inline, layer.row_mode())))),
        (true, false) => Ok(Some(Keyboard::Reply(vec![reply]))),
        (true, true) => Ok(None),
    }
}

fn inline_rows(mut buttons: Vec<InlineKeyboardButton>, row_mode: bool) -> Vec<Vec<InlineKeyboardButton>> {
    if row_mode && buttons.len() > 1 {
        let last = buttons.split_off(buttons.len() - 1);
        return vec![buttons, last];
    }
    buttons.into_iter().map(|button| vec![button]).collect()
}
