use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tokio::sync::mpsc::UnboundedSender;
use tracing::debug;

use crate::models::DisabilityType;
use crate::voice::intent::{not_understood, FeedbackLang, Intent, IntentResolver};

pub const FONT_SIZE_DEFAULT: u32 = 16;
pub const FONT_SIZE_MIN: u32 = 12;
pub const FONT_SIZE_MAX: u32 = 32;
pub const FONT_SIZE_STEP: u32 = 2;

/// Minimum gap between two executed voice commands.
pub const COMMAND_COOLDOWN: Duration = Duration::from_millis(400);
/// Pixels scrolled by one "scroll up/down" command.
pub const VOICE_SCROLL_PX: i32 = 400;

/// Client-side accessibility preferences driven by voice and by the disability profile.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessibilitySettings {
    pub disability_type: DisabilityType,
    pub font_size: u32,
    pub high_contrast: bool,
    pub focus_mode: bool,
    pub captions_enabled: bool,
    pub eye_tracking_enabled: bool,
    pub hand_tracking_enabled: bool,
    pub voice_awake: bool,
}

impl Default for AccessibilitySettings {
    fn default() -> Self {
        Self {
            disability_type: DisabilityType::None,
            font_size: FONT_SIZE_DEFAULT,
            high_contrast: false,
            focus_mode: false,
            captions_enabled: false,
            eye_tracking_enabled: false,
            hand_tracking_enabled: false,
            voice_awake: false,
        }
    }
}

impl AccessibilitySettings {
    pub fn apply_disability_preset(&mut self, disability_type: DisabilityType) {
        self.disability_type = disability_type;
        let (high_contrast, font_size, captions_enabled, focus_mode) = match disability_type {
            DisabilityType::Visual => (true, 24, false, false),
            DisabilityType::Hearing => (false, 16, true, false),
            DisabilityType::Motor => (false, 20, false, false),
            DisabilityType::Cognitive => (false, 18, false, true),
            DisabilityType::None => (false, FONT_SIZE_DEFAULT, false, false),
        };
        self.high_contrast = high_contrast;
        self.font_size = font_size;
        self.captions_enabled = captions_enabled;
        self.focus_mode = focus_mode;
    }

    pub fn increase_font(&mut self) {
        self.font_size = (self.font_size + FONT_SIZE_STEP).min(FONT_SIZE_MAX);
    }

    pub fn decrease_font(&mut self) {
        self.font_size = self.font_size.saturating_sub(FONT_SIZE_STEP).max(FONT_SIZE_MIN);
    }

    /// Gaze and hand pointers never run together.
    pub fn set_eye_tracking(&mut self, enabled: bool) {
        if enabled {
            self.hand_tracking_enabled = false;
        }
        self.eye_tracking_enabled = enabled;
    }

    pub fn set_hand_tracking(&mut self, enabled: bool) {
        if enabled {
            self.eye_tracking_enabled = false;
        }
        self.hand_tracking_enabled = enabled;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FeedbackLevel {
    Success,
    Info,
    Error,
}

/// Side effects requested by the voice controller; the UI layer performs them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum UiCommand {
    Navigate { route: String },
    GoBack,
    ScrollBy { pixels: i32 },
    Speak { text: String, lang: String },
    Feedback { message: String, level: FeedbackLevel },
    SettingsChanged { settings: AccessibilitySettings },
}

/// One speech recognition result: ranked alternatives plus the final flag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Utterance {
    pub alternatives: Vec<String>,
    pub is_final: bool,
}

impl Utterance {
    pub fn final_text(text: impl Into<String>) -> Self {
        Self {
            alternatives: vec![text.into()],
            is_final: true,
        }
    }

    pub fn interim_text(text: impl Into<String>) -> Self {
        Self {
            alternatives: vec![text.into()],
            is_final: false,
        }
    }
}

pub struct VoiceController {
    settings: AccessibilitySettings,
    recognition_lang: String,
    thinking: bool,
    last_command_at: Option<Instant>,
    resolver: IntentResolver,
    commands: UnboundedSender<UiCommand>,
}

impl VoiceController {
    pub fn new(recognition_lang: impl Into<String>, commands: UnboundedSender<UiCommand>) -> Self {
        Self {
            settings: AccessibilitySettings::default(),
            recognition_lang: recognition_lang.into(),
            thinking: false,
            last_command_at: None,
            resolver: IntentResolver::new(),
            commands,
        }
    }

    pub fn settings(&self) -> &AccessibilitySettings {
        &self.settings
    }

    pub fn settings_mut(&mut self) -> &mut AccessibilitySettings {
        &mut self.settings
    }

    pub fn is_awake(&self) -> bool {
        self.settings.voice_awake
    }

    /// While the assistant is answering, every utterance is ignored.
    pub fn set_thinking(&mut self, thinking: bool) {
        self.thinking = thinking;
    }

    pub fn set_recognition_lang(&mut self, lang: impl Into<String>) {
        self.recognition_lang = lang.into();
    }

    fn lang(&self) -> FeedbackLang {
        FeedbackLang::from_recognition_lang(&self.recognition_lang)
    }

    pub fn handle(&mut self, utterance: &Utterance) -> Option<Intent> {
        self.handle_at(utterance, Instant::now())
    }

    /// Returns the intent that was matched and carried out, if any.
    pub fn handle_at(&mut self, utterance: &Utterance, now: Instant) -> Option<Intent> {
        if self.thinking {
            return None;
        }
        if self
            .last_command_at
            .is_some_and(|last| now.saturating_duration_since(last) < COMMAND_COOLDOWN)
        {
            return None;
        }

        if !utterance.is_final {
            let first = utterance.alternatives.first()?;
            let intent = self.resolver.resolve(first).map(|m| m.intent)?;
            if intent == Intent::EnableVoice && !self.settings.voice_awake {
                self.last_command_at = Some(now);
                return self.execute(intent).then_some(intent);
            }
            return None;
        }

        let matched = utterance
            .alternatives
            .iter()
            .find_map(|alt| self.resolver.resolve(alt).map(|m| m.intent));

        match matched {
            Some(intent) => {
                self.last_command_at = Some(now);
                self.execute(intent).then_some(intent)
            }
            None => {
                if self.settings.voice_awake {
                    let message = not_understood(self.lang());
                    self.feedback(message, FeedbackLevel::Error);
                    self.speak(message);
                }
                None
            }
        }
    }

    /// Returns false when the intent was dropped because the controller is asleep.
    fn execute(&mut self, intent: Intent) -> bool {
        if !self.settings.voice_awake && intent != Intent::EnableVoice {
            debug!(component = "voice", intent = %intent, "ignored while asleep");
            return false;
        }

        let message = intent.feedback(self.lang());
        debug!(component = "voice", intent = %intent, "intent matched");

        match intent {
            Intent::EnableVoice => {
                if !self.settings.voice_awake {
                    self.settings.voice_awake = true;
                    self.settings_changed();
                    self.speak(message);
                    self.feedback(message, FeedbackLevel::Success);
                }
                return true;
            }
            Intent::StopListening => {
                self.settings.voice_awake = false;
                self.settings_changed();
                self.speak(message);
                self.feedback(message, FeedbackLevel::Info);
                return true;
            }
            Intent::NavigateHome => self.navigate("/"),
            Intent::NavigateDashboard | Intent::NavigateLessons => self.navigate("/dashboard"),
            Intent::NavigateLogin => self.navigate("/login"),
            Intent::NavigateBack => self.emit(UiCommand::GoBack),
            Intent::ScrollUp => self.emit(UiCommand::ScrollBy {
                pixels: -VOICE_SCROLL_PX,
            }),
            Intent::ScrollDown => self.emit(UiCommand::ScrollBy {
                pixels: VOICE_SCROLL_PX,
            }),
            _ => self.update_settings(intent),
        }

        self.feedback(message, FeedbackLevel::Success);
        self.speak(message);
        true
    }

    fn update_settings(&mut self, intent: Intent) {
        let before = self.settings.clone();
        let s = &mut self.settings;
        match intent {
            Intent::IncreaseFont => s.increase_font(),
            Intent::DecreaseFont => s.decrease_font(),
            Intent::EnableContrast => s.high_contrast = true,
            Intent::DisableContrast => s.high_contrast = false,
            Intent::EnableCaptions => s.captions_enabled = true,
            Intent::DisableCaptions => s.captions_enabled = false,
            Intent::EnableFocus => s.focus_mode = true,
            Intent::DisableFocus => s.focus_mode = false,
            Intent::EnableEyeTracker => s.set_eye_tracking(true),
            Intent::DisableEyeTracker => s.set_eye_tracking(false),
            Intent::EnableHandTracker => s.set_hand_tracking(true),
            Intent::DisableHandTracker => s.set_hand_tracking(false),
            Intent::SetVisualMode => s.apply_disability_preset(DisabilityType::Visual),
            Intent::SetHearingMode => s.apply_disability_preset(DisabilityType::Hearing),
            Intent::SetMotorMode => s.apply_disability_preset(DisabilityType::Motor),
            Intent::SetCognitiveMode => s.apply_disability_preset(DisabilityType::Cognitive),
            Intent::ResetDisabilityMode => s.apply_disability_preset(DisabilityType::None),
            _ => {}
        }
        if self.settings != before {
            self.settings_changed();
        }
    }

    fn navigate(&self, route: &str) {
        self.emit(UiCommand::Navigate {
            route: route.to_string(),
        });
    }

    fn speak(&self, text: &str) {
        self.emit(UiCommand::Speak {
            text: text.to_string(),
            lang: self.lang().speech_locale().to_string(),
        });
    }

    fn feedback(&self, message: &str, level: FeedbackLevel) {
        self.emit(UiCommand::Feedback {
            message: message.to_string(),
            level,
        });
    }

    fn settings_changed(&self) {
        self.emit(UiCommand::SettingsChanged {
            settings: self.settings.clone(),
        });
    }

    fn emit(&self, command: UiCommand) {
        if self.commands.send(command).is_err() {
            debug!(component = "voice", "UI command receiver dropped");
        }
    }
}
