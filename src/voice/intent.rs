//! Bilingual (English + Hindi) voice command matching.
//!
//! A transcript is normalized, scored against every trigger phrase and the
//! best-scoring intent wins when it clears [`MIN_MATCH_SCORE`].

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::sync::LazyLock;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Intent {
    EnableVoice,
    NavigateHome,
    NavigateDashboard,
    NavigateLessons,
    NavigateLogin,
    NavigateBack,
    EnableEyeTracker,
    DisableEyeTracker,
    EnableHandTracker,
    DisableHandTracker,
    IncreaseFont,
    DecreaseFont,
    EnableContrast,
    DisableContrast,
    EnableCaptions,
    DisableCaptions,
    EnableFocus,
    DisableFocus,
    ScrollUp,
    ScrollDown,
    StopListening,
    SetVisualMode,
    SetHearingMode,
    SetMotorMode,
    SetCognitiveMode,
    ResetDisabilityMode,
}

/// Trigger phrases per intent. Order matters: on equal scores the earlier entry wins.
pub const COMMAND_TABLE: &[(Intent, &[&str])] = &[
    (
        Intent::EnableVoice,
        &[
            "voice command on", "voice on", "वॉइस कमांड ऑन", "आवाज चालू करो",
            "voice chalu karo", "kuch bolo", "hey equaled", "वॉयस कमांड ऑन",
        ],
    ),
    (
        Intent::NavigateHome,
        &[
            "go to home", "home page", "open home", "home kholo", "ghar jao",
            "होम खोलो", "होम पेज", "होम पर जाओ", "home par jao", "landing page",
        ],
    ),
    (
        Intent::NavigateDashboard,
        &[
            "go to dashboard", "open dashboard", "dashboard kholo", "dashboard par jao",
            "डैशबोर्ड खोलो", "डैशबोर्ड पर जाओ", "show dashboard", "mera dashboard",
            "dashboard open karo", "डैशबोर्ड ओपन करो", "डैशबोर्ड दिखाओ",
            "गो टू डैशबोर्ड", "ओपन डैशबोर्ड", "डैशबोर्ड",
        ],
    ),
    (
        Intent::NavigateLessons,
        &[
            "go to lessons", "open lessons", "show lessons", "lessons kholo",
            "lesson par jao", "पाठ खोलो", "lesson dikhao", "my lessons",
            "lesson open karo", "लेसन ओपन करो", "लेसन दिखाओ",
            "गो टू लेसन", "ओपन लेसन", "लेसन",
        ],
    ),
    (
        Intent::NavigateLogin,
        &[
            "login", "log in", "sign in", "login karo", "open login", "go to login",
            "लॉगिन", "लॉग इन", "लॉगिन पेज खोलो", "sign in page",
        ],
    ),
    (
        Intent::NavigateBack,
        &[
            "go back", "back jao", "wapis jao", "previous page", "pichhe jao",
            "वापस जाओ", "पीछे जाओ", "undo navigation",
        ],
    ),
    (
        Intent::EnableEyeTracker,
        &[
            "turn on eye tracker", "enable eye tracker", "eye tracker on",
            "aankh tracker chalu karo", "eye tracking on karo",
            "आई ट्रैकर चालू करो", "आई ट्रैकर ऑन करो", "eye tracker chalu karo",
            "टर्न ऑन आई ट्रैकर", "इनेबल आई ट्रैकर", "आई ट्रैकर",
        ],
    ),
    (
        Intent::DisableEyeTracker,
        &[
            "turn off eye tracker", "disable eye tracker", "eye tracker off",
            "aankh tracker band karo", "eye tracking off karo",
            "आई ट्रैकर बंद करो", "eye tracker band karo",
            "टर्न ऑफ आई ट्रैकर", "डिसेबल आई ट्रैकर",
        ],
    ),
    (
        Intent::EnableHandTracker,
        &[
            "turn on hand tracker", "enable hand tracker", "hand tracker on",
            "hand tracker chalu karo", "hand control on karo",
            "हैंड ट्रैकर चालू करो", "हाथ ट्रैकर ऑन करो",
        ],
    ),
    (
        Intent::DisableHandTracker,
        &[
            "turn off hand tracker", "disable hand tracker", "hand tracker off",
            "hand tracker band karo", "hand control off karo",
            "हैंड ट्रैकर बंद करो", "हाथ ट्रैकर बंद करो",
        ],
    ),
    (
        Intent::IncreaseFont,
        &[
            "increase font", "font bada karo", "make text bigger", "text zoom in",
            "फॉन्ट बड़ा करो", "akshar bade karo", "bada karo", "font size up",
            "font increase karo", "फॉन्ट इंक्रीज करो", "big font",
            "इंक्रीज फॉन्ट", "फॉन्ट साइज बढ़ाओ", "फॉन्ट",
        ],
    ),
    (
        Intent::DecreaseFont,
        &[
            "decrease font", "font chota karo", "make text smaller", "text zoom out",
            "फॉन्ट छोटा करो", "akshar chote karo", "chota karo", "font size down",
            "font decrease karo", "फॉन्ट डिक्रीज करो", "small font",
        ],
    ),
    (
        Intent::EnableContrast,
        &[
            "enable contrast", "high contrast on", "contrast on karo", "dark mode",
            "कॉन्ट्रास्ट चालू करो", "contrast chalu karo", "high contrast mode",
        ],
    ),
    (
        Intent::DisableContrast,
        &[
            "disable contrast", "high contrast off", "contrast off karo", "light mode",
            "कॉन्ट्रास्ट बंद करो", "contrast band karo",
        ],
    ),
    (
        Intent::EnableCaptions,
        &[
            "enable captions", "turn on captions", "subtitles on", "captions on karo",
            "कैप्शन चालू करो", "subtitle on karo",
        ],
    ),
    (
        Intent::DisableCaptions,
        &[
            "disable captions", "turn off captions", "subtitles off", "captions off karo",
            "कैप्शन बंद करो", "subtitle off karo",
        ],
    ),
    (
        Intent::EnableFocus,
        &[
            "enable focus mode", "focus mode on", "focus on karo", "dhyan mode",
            "फोकस मोड चालू करो", "focus chalu karo",
        ],
    ),
    (
        Intent::DisableFocus,
        &[
            "disable focus mode", "focus mode off", "focus band karo",
            "फोकस मोड बंद करो", "focus band karo",
        ],
    ),
    (
        Intent::ScrollUp,
        &[
            "scroll up", "page up", "upar jao", "upar scroll karo",
            "ऊपर जाओ", "ऊपर स्क्रॉल करो",
        ],
    ),
    (
        Intent::ScrollDown,
        &[
            "scroll down", "page down", "neeche jao", "neeche scroll karo",
            "नीचे जाओ", "नीचे स्क्रॉल करो",
        ],
    ),
    (
        Intent::StopListening,
        &[
            "stop listening", "voice off", "voice band karo", "quiet",
            "आवाज बंद करो", "sunaai band karo", "stop",
        ],
    ),
    (
        Intent::SetVisualMode,
        &[
            "visual mode", "enable visual mode", "visual mode on", "blind mode",
            "drishti mode", "visual accessibility", "आंखों का मोड", "visual on",
            "vision mode", "visual impairment mode", "drashti mode",
        ],
    ),
    (
        Intent::SetHearingMode,
        &[
            "hearing mode", "enable hearing mode", "hearing mode on", "deaf mode",
            "shravaan mode", "hearing accessibility", "बहरापन मोड", "hearing on",
            "caption mode", "subtitle mode",
        ],
    ),
    (
        Intent::SetMotorMode,
        &[
            "motor mode", "enable motor mode", "motor mode on", "mobility mode",
            "haath mode", "motor accessibility", "motor impairment mode", "motor on",
            "physical mode",
        ],
    ),
    (
        Intent::SetCognitiveMode,
        &[
            "cognitive mode", "enable cognitive mode", "focus mode on", "learning mode",
            "dhyan mode", "cognitive accessibility", "cognitive on", "concentration mode",
        ],
    ),
    (
        Intent::ResetDisabilityMode,
        &[
            "reset mode", "normal mode", "default mode", "disable mode",
            "mode band karo", "reset accessibility", "samaanya mode", "सामान्य मोड",
            "no mode", "clear mode",
        ],
    ),
];

/// Filler words dropped when they stand alone as a token.
pub const FILLER_WORDS: &[&str] = &[
    "please", "karo", "kardo", "ok", "okay", "hey", "hello", "zara", "jara", "toh", "to", "na",
    "aur", "bhi",
];

pub const MIN_MATCH_SCORE: u32 = 20;

const EXACT_SCORE: u32 = 100;
const CONTAINS_PHRASE_BASE: u32 = 80;
const PHRASE_FRAGMENT_BASE: u32 = 60;
const PHRASE_FRAGMENT_MIN_CHARS: usize = 3;
const WORD_OVERLAP_SCORE: u32 = 20;

static PUNCTUATION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"[।,.!?'"]"#).expect("punctuation pattern is valid"));

static RESOLVER: LazyLock<IntentResolver> = LazyLock::new(IntentResolver::new);

/// Language used for spoken and on-screen feedback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FeedbackLang {
    #[default]
    En,
    Hi,
}

impl FeedbackLang {
    /// `hi-IN`, `hi` and friends select Hindi; everything else English.
    pub fn from_recognition_lang(lang: &str) -> Self {
        if lang.starts_with("hi") {
            FeedbackLang::Hi
        } else {
            FeedbackLang::En
        }
    }

    pub fn speech_locale(&self) -> &'static str {
        match self {
            FeedbackLang::En => "en-US",
            FeedbackLang::Hi => "hi-IN",
        }
    }
}

impl Intent {
    pub fn as_str(&self) -> &'static str {
        match self {
            Intent::EnableVoice => "ENABLE_VOICE",
            Intent::NavigateHome => "NAVIGATE_HOME",
            Intent::NavigateDashboard => "NAVIGATE_DASHBOARD",
            Intent::NavigateLessons => "NAVIGATE_LESSONS",
            Intent::NavigateLogin => "NAVIGATE_LOGIN",
            Intent::NavigateBack => "NAVIGATE_BACK",
            Intent::EnableEyeTracker => "ENABLE_EYE_TRACKER",
            Intent::DisableEyeTracker => "DISABLE_EYE_TRACKER",
            Intent::EnableHandTracker => "ENABLE_HAND_TRACKER",
            Intent::DisableHandTracker => "DISABLE_HAND_TRACKER",
            Intent::IncreaseFont => "INCREASE_FONT",
            Intent::DecreaseFont => "DECREASE_FONT",
            Intent::EnableContrast => "ENABLE_CONTRAST",
            Intent::DisableContrast => "DISABLE_CONTRAST",
            Intent::EnableCaptions => "ENABLE_CAPTIONS",
            Intent::DisableCaptions => "DISABLE_CAPTIONS",
            Intent::EnableFocus => "ENABLE_FOCUS",
            Intent::DisableFocus => "DISABLE_FOCUS",
            Intent::ScrollUp => "SCROLL_UP",
            Intent::ScrollDown => "SCROLL_DOWN",
            Intent::StopListening => "STOP_LISTENING",
            Intent::SetVisualMode => "SET_VISUAL_MODE",
            Intent::SetHearingMode => "SET_HEARING_MODE",
            Intent::SetMotorMode => "SET_MOTOR_MODE",
            Intent::SetCognitiveMode => "SET_COGNITIVE_MODE",
            Intent::ResetDisabilityMode => "RESET_DISABILITY_MODE",
        }
    }

    pub fn feedback(&self, lang: FeedbackLang) -> &'static str {
        let (en, hi) = match self {
            Intent::NavigateHome => ("Going to Home page", "होम पेज खोल रहा हूँ..."),
            Intent::NavigateDashboard => ("Opening Dashboard", "डैशबोर्ड खोल रहा हूँ..."),
            Intent::NavigateLessons => ("Opening Lessons", "पाठ खोल रहा हूँ..."),
            Intent::NavigateLogin => ("Going to Login page", "लॉगिन पेज खोल रहा हूँ..."),
            Intent::NavigateBack => ("Going Back", "वापस जा रहा हूँ..."),
            Intent::EnableEyeTracker => ("Eye Tracker enabled", "आई ट्रैकर चालू हो रहा है..."),
            Intent::DisableEyeTracker => ("Eye Tracker disabled", "आई ट्रैकर बंद हो रहा है..."),
            Intent::EnableHandTracker => ("Hand Control enabled", "हाथ नियंत्रण चालू हो रहा है..."),
            Intent::DisableHandTracker => ("Hand Control disabled", "हाथ नियंत्रण बंद हो रहा है..."),
            Intent::IncreaseFont => ("Font size increased", "फॉन्ट बड़ा हो रहा है..."),
            Intent::DecreaseFont => ("Font size decreased", "फॉन्ट छोटा हो रहा है..."),
            Intent::EnableContrast => ("High contrast enabled", "हाई कॉन्ट्रास्ट चालू है"),
            Intent::DisableContrast => ("Contrast disabled", "कॉन्ट्रास्ट बंद है"),
            Intent::EnableCaptions => ("Captions enabled", "कैप्शन चालू है"),
            Intent::DisableCaptions => ("Captions disabled", "कैप्शन बंद है"),
            Intent::EnableFocus => ("Focus mode enabled", "फोकस मोड चालू है"),
            Intent::DisableFocus => ("Focus mode disabled", "फोकस मोड बंद है"),
            Intent::ScrollUp => ("Scrolling up", "ऊपर स्क्रॉल हो रहा है"),
            Intent::ScrollDown => ("Scrolling down", "नीचे स्क्रॉल हो रहा है"),
            Intent::StopListening => ("Voice control stopped", "आवाज नियंत्रण बंद है"),
            Intent::EnableVoice => ("Voice control activated", "वॉइस कंट्रोल चालू हो गया है"),
            Intent::SetVisualMode => ("Visual mode enabled", "विज़ुअल मोड चालू है"),
            Intent::SetHearingMode => ("Hearing mode enabled", "सुनने का मोड चालू है"),
            Intent::SetMotorMode => ("Motor mode enabled", "मोटर मोड चालू है"),
            Intent::SetCognitiveMode => ("Cognitive mode enabled", "कॉग्निटिव मोड चालू है"),
            Intent::ResetDisabilityMode => ("Accessibility reset", "सब वापस सामान्य है"),
        };
        match lang {
            FeedbackLang::En => en,
            FeedbackLang::Hi => hi,
        }
    }
}

impl fmt::Display for Intent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub fn not_understood(lang: FeedbackLang) -> &'static str {
    match lang {
        FeedbackLang::En => "Command not understood",
        FeedbackLang::Hi => "कमांड समझ में नहीं आई",
    }
}

/// Lowercases, blanks out punctuation, drops filler tokens and collapses whitespace.
pub fn normalize(text: &str) -> String {
    let lowered = text.to_lowercase();
    let blanked = PUNCTUATION.replace_all(&lowered, " ");
    blanked
        .split_whitespace()
        .filter(|token| !FILLER_WORDS.contains(token))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Scores one normalized transcript against one normalized phrase.
pub fn score(text: &str, phrase: &str) -> u32 {
    if phrase.is_empty() {
        return 0;
    }
    if text == phrase {
        return EXACT_SCORE;
    }
    if text.contains(phrase) {
        return CONTAINS_PHRASE_BASE + phrase.chars().count() as u32;
    }
    let text_len = text.chars().count();
    if phrase.contains(text) && text_len > PHRASE_FRAGMENT_MIN_CHARS {
        return PHRASE_FRAGMENT_BASE + text_len as u32;
    }

    let text_words: HashSet<&str> = text.split(' ').filter(|w| !w.is_empty()).collect();
    let overlap = phrase
        .split(' ')
        .filter(|w| !w.is_empty() && text_words.contains(w))
        .count() as u32;
    overlap * WORD_OVERLAP_SCORE
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IntentMatch {
    pub intent: Intent,
    pub score: u32,
}

/// Command table with every phrase normalized once up front.
#[derive(Debug, Clone)]
pub struct IntentResolver {
    entries: Vec<(Intent, Vec<String>)>,
}

impl Default for IntentResolver {
    fn default() -> Self {
        Self::new()
    }
}

impl IntentResolver {
    pub fn new() -> Self {
        let entries = COMMAND_TABLE
            .iter()
            .map(|(intent, phrases)| {
                let normalized = phrases
                    .iter()
                    .map(|p| normalize(p))
                    .filter(|p| !p.is_empty())
                    .collect();
                (*intent, normalized)
            })
            .collect();
        Self { entries }
    }

    pub fn resolve(&self, raw: &str) -> Option<IntentMatch> {
        if raw.is_empty() {
            return None;
        }
        let text = normalize(raw);

        let mut best: Option<IntentMatch> = None;
        for (intent, phrases) in &self.entries {
            for phrase in phrases {
                let s = score(&text, phrase);
                if s > best.map_or(0, |b| b.score) {
                    best = Some(IntentMatch {
                        intent: *intent,
                        score: s,
                    });
                }
            }
        }

        best.filter(|b| b.score >= MIN_MATCH_SCORE)
    }
}

/// Maps a raw speech transcript to an intent using the shared resolver.
pub fn process_command(raw: &str) -> Option<Intent> {
    RESOLVER.resolve(raw).map(|m| m.intent)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resolve(raw: &str) -> Option<IntentMatch> {
        IntentResolver::new().resolve(raw)
    }

    #[test]
    fn test_normalize_strips_punctuation_and_fillers() {
        assert_eq!(normalize("  Please, GO to   Dashboard karo! "), "go dashboard");
        assert_eq!(normalize("डैशबोर्ड खोलो।"), "डैशबोर्ड खोलो");
        assert_eq!(normalize("ok okay hey"), "");
        assert_eq!(normalize("tomorrow"), "tomorrow");
    }

    #[test]
    fn test_score_paths() {
        assert_eq!(score("go back", "go back"), 100);
        assert_eq!(score("i want go back now", "go back"), 87);
        assert_eq!(score("dashboard", "go dashboard"), 69);
        assert_eq!(score("back", "go back"), 60 + 4);
        assert_eq!(score("go", "go back"), 20);
        assert_eq!(score("eye banana tracker", "eye tracker on"), 40);
        assert_eq!(score("anything", ""), 0);
    }

    #[test]
    fn test_fragment_needs_more_than_three_chars() {
        // "off" is contained in the phrase but too short to count as a fragment
        assert_eq!(score("off", "eye tracker off"), 20);
    }

    #[test]
    fn test_resolver_scores() {
        let m = resolve("i want to go back now").unwrap();
        assert_eq!(m.intent, Intent::NavigateBack);
        assert_eq!(m.score, 87);

        let m = resolve("dashboard").unwrap();
        assert_eq!(m.intent, Intent::NavigateDashboard);
        assert_eq!(m.score, 69);
    }

    #[test]
    fn test_ties_keep_earlier_table_entry() {
        let m = resolve("eye banana tracker").unwrap();
        assert_eq!(m.score, 40);
        assert_eq!(m.intent, Intent::EnableEyeTracker);

        // "focus mode on" is listed for both focus and cognitive mode
        assert_eq!(process_command("focus mode on"), Some(Intent::EnableFocus));
    }

    #[test]
    fn test_empty_and_filler_only_input() {
        assert_eq!(process_command(""), None);
        assert_eq!(process_command("please ok"), None);
        assert_eq!(process_command("xyz nonsense"), None);
    }

    #[test]
    fn test_intent_wire_names() {
        assert_eq!(
            serde_json::to_value(Intent::NavigateDashboard).unwrap(),
            "NAVIGATE_DASHBOARD"
        );
        for (intent, _) in COMMAND_TABLE {
            assert_eq!(serde_json::to_value(intent).unwrap(), intent.as_str());
        }
        assert_eq!(COMMAND_TABLE.len(), 26);
    }

    #[test]
    fn test_feedback_language() {
        assert_eq!(FeedbackLang::from_recognition_lang("hi-IN"), FeedbackLang::Hi);
        assert_eq!(FeedbackLang::from_recognition_lang("en-US"), FeedbackLang::En);
        assert_eq!(Intent::ScrollDown.feedback(FeedbackLang::En), "Scrolling down");
        assert_eq!(not_understood(FeedbackLang::Hi), "कमांड समझ में नहीं आई");
    }
}
