//! Moods command handler.

use anyhow::Result;
use reverie_engine::Mood;

/// List every mood with its chord frequencies.
pub fn execute() -> Result<()> {
    println!("{:<12} Chord (Hz)", "Mood");
    for mood in Mood::ALL {
        println!("{:<12} {}", mood_name(mood)?, format_chord(mood.chord()));
    }
    Ok(())
}

/// The name a script uses for `mood`.
fn mood_name(mood: Mood) -> Result<String> {
    let value = serde_json::to_value(mood)?;
    Ok(value.as_str().unwrap_or_default().to_string())
}

fn format_chord(chord: &[f32]) -> String {
    chord
        .iter()
        .map(|f| format!("{f:.2}"))
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mood_names_match_script_tags() {
        assert_eq!(mood_name(Mood::DeepFocus).unwrap(), "deep_focus");
        assert_eq!(mood_name(Mood::Ethereal).unwrap(), "ethereal");
    }

    #[test]
    fn test_format_chord() {
        assert_eq!(format_chord(&[110.0, 164.81]), "110.00, 164.81");
    }
}
