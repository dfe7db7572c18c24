use crate::palette::Rgb;
use crate::shape::ShapeId;
use serde::{Deserialize, Serialize};

/// One stage of the cycle: what the cloud turns into and how it is labelled.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Era {
    pub name: String,
    #[serde(default)]
    pub caption: String,
    pub shape: ShapeId,
    pub color: Rgb,
    /// Color of the orbiting accent body while this era is shown.
    #[serde(default = "default_accent")]
    pub accent: Rgb,
}

fn default_accent() -> Rgb {
    Rgb::from_hex(0xffaa00)
}

impl Era {
    pub fn new(name: &str, caption: &str, shape: ShapeId, color: Rgb, accent: Rgb) -> Self {
        Self {
            name: name.to_string(),
            caption: caption.to_string(),
            shape,
            color,
            accent,
        }
    }
}

/// The stock five-era story.
pub fn default_eras() -> Vec<Era> {
    vec![
        Era::new(
            "GENESIS",
            "Everything starts as noise.",
            ShapeId::Random,
            Rgb::from_hex(0xffffff),
            Rgb::from_hex(0xffaa00),
        ),
        Era::new(
            "AGRARIAN",
            "We learned to work the land.",
            ShapeId::Plow,
            Rgb::from_hex(0x4caf50),
            Rgb::from_hex(0xffd700),
        ),
        Era::new(
            "MARITIME",
            "Then we crossed the oceans.",
            ShapeId::Ship,
            Rgb::from_hex(0x2196f3),
            Rgb::from_hex(0xe0e0e0),
        ),
        Era::new(
            "INDUSTRIAL",
            "Steam and steel moved the world.",
            ShapeId::Train,
            Rgb::from_hex(0xff5722),
            Rgb::from_hex(0xff4500),
        ),
        Era::new(
            "DIGITAL",
            "Now everything is connected.",
            ShapeId::Sphere,
            Rgb::from_hex(0x00bcd4),
            Rgb::from_hex(0x00ffff),
        ),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn default_story_has_five_distinct_eras() {
        let eras = default_eras();
        assert_eq!(eras.len(), 5);
        assert_eq!(eras[0].shape, ShapeId::Random);
        assert_eq!(eras[4].shape, ShapeId::Sphere);
    }

    #[test]
    fn deserializes_from_json() {
        let era: Era = serde_json::from_str(
            r##"{"name":"DIGITAL","shape":"ring","color":"#00bcd4"}"##,
        )
        .unwrap();
        assert_eq!(
            era,
            Era::new(
                "DIGITAL",
                "",
                ShapeId::Ring,
                Rgb::from_hex(0x00bcd4),
                Rgb::from_hex(0xffaa00)
            )
        );
    }

    #[test]
    fn unknown_shape_in_json_is_rejected() {
        let res = serde_json::from_str::<Era>(
            r##"{"name":"X","shape":"portrait","color":"#ffffff"}"##,
        );
        assert!(res.is_err());
    }
}
