//! Voice command handling: transcript normalization, intent matching and the
//! wake/sleep controller that turns matched intents into UI commands.

pub mod controller;
pub mod intent;

pub use controller::{AccessibilitySettings, FeedbackLevel, UiCommand, Utterance, VoiceController};
pub use intent::{process_command, FeedbackLang, Intent, IntentMatch, IntentResolver};
