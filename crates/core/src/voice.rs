//! Voice configuration and the fixed voice lookup table
//!
//! Region (accent) and speaker gender resolve to exactly one concrete
//! Deepgram voice id. Unrecognized combinations resolve to the US female
//! default rather than failing.

use serde::{Deserialize, Serialize};

/// Supported accent regions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Accent {
    /// American English
    #[default]
    Us,
    /// British English
    Uk,
}

impl Accent {
    /// Case-insensitive parse of a caller-supplied accent string
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.to_ascii_lowercase().as_str() {
            "us" => Some(Accent::Us),
            "uk" => Some(Accent::Uk),
            _ => None,
        }
    }
}

/// Supported speaker genders
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum VoiceGender {
    #[default]
    Female,
    Male,
}

impl VoiceGender {
    /// Case-insensitive parse of a caller-supplied gender string
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.to_ascii_lowercase().as_str() {
            "female" => Some(VoiceGender::Female),
            "male" => Some(VoiceGender::Male),
            _ => None,
        }
    }
}

/// Per-session voice choice
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Default)]
pub struct VoiceSelection {
    pub accent: Accent,
    pub gender: VoiceGender,
}

/// Caller input is loosely typed: a missing field takes its default, and
/// an unrecognized value degrades the whole selection to the default
/// voice instead of rejecting the request.
impl<'de> Deserialize<'de> for VoiceSelection {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        #[derive(Deserialize, Default)]
        #[serde(default)]
        struct Loose {
            accent: Option<String>,
            gender: Option<String>,
        }

        let loose = Loose::deserialize(deserializer)?;
        let accent = match loose.accent.as_deref() {
            None => Some(Accent::default()),
            Some(raw) => Accent::parse(raw),
        };
        let gender = match loose.gender.as_deref() {
            None => Some(VoiceGender::default()),
            Some(raw) => VoiceGender::parse(raw),
        };
        Ok(match (accent, gender) {
            (Some(accent), Some(gender)) => Self { accent, gender },
            _ => Self::default(),
        })
    }
}

impl VoiceSelection {
    pub fn new(accent: Accent, gender: VoiceGender) -> Self {
        Self { accent, gender }
    }

    /// Concrete voice id for this selection
    pub fn voice_id(&self) -> &'static str {
        resolve_voice(self.accent, self.gender)
    }

    /// Human-readable description of the resolved voice
    pub fn description(&self) -> &'static str {
        voice_description(self.voice_id())
    }
}

/// Default voice used for any unrecognized selection
pub const DEFAULT_VOICE: &str = "aura-asteria-en";

/// Resolve accent + gender to a concrete Deepgram Aura voice id
pub fn resolve_voice(accent: Accent, gender: VoiceGender) -> &'static str {
    match (accent, gender) {
        (Accent::Us, VoiceGender::Female) => "aura-asteria-en",
        (Accent::Us, VoiceGender::Male) => "aura-arcas-en",
        (Accent::Uk, VoiceGender::Female) => "aura-luna-en",
        (Accent::Uk, VoiceGender::Male) => "aura-perseus-en",
    }
}

/// Human-readable voice description, carried in browser-fallback events
/// so the client can pick a comparable local voice
pub fn voice_description(voice_id: &str) -> &'static str {
    match voice_id {
        "aura-asteria-en" => "Female US English voice - clear and professional",
        "aura-arcas-en" => "Male US English voice - warm and engaging",
        "aura-luna-en" => "Female British English voice - polished and expressive",
        "aura-perseus-en" => "Male British English voice - confident and refined",
        _ => "Female US English voice - clear and professional",
    }
}
