//! Serde helpers for clock times crossing the wire as `"HH:MM"` (the backend
//! also emits `"HH:MM:SS"`; both are accepted on input).

use chrono::NaiveTime;

pub fn parse_clock(raw: &str) -> Option<NaiveTime> {
    NaiveTime::parse_from_str(raw, "%H:%M:%S")
        .or_else(|_| NaiveTime::parse_from_str(raw, "%H:%M"))
        .ok()
}

pub mod hhmm {
    use chrono::NaiveTime;
    use serde::{de::Error, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(t: &NaiveTime, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&t.format("%H:%M").to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<NaiveTime, D::Error> {
        let raw = String::deserialize(deserializer)?;
        super::parse_clock(&raw)
            .ok_or_else(|| D::Error::custom(format!("invalid clock time: {raw}")))
    }
}

pub mod hhmm_opt {
    use chrono::NaiveTime;
    use serde::{de::Error, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(
        t: &Option<NaiveTime>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match t {
            Some(t) => serializer.serialize_str(&t.format("%H:%M").to_string()),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<NaiveTime>, D::Error> {
        let raw = Option::<String>::deserialize(deserializer)?;
        match raw {
            None => Ok(None),
            Some(raw) if raw.is_empty() => Ok(None),
            Some(raw) => super::parse_clock(&raw)
                .map(Some)
                .ok_or_else(|| D::Error::custom(format!("invalid clock time: {raw}"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_both_wire_formats() {
        assert_eq!(
            parse_clock("09:20"),
            NaiveTime::from_hms_opt(9, 20, 0)
        );
        assert_eq!(
            parse_clock("18:00:00"),
            NaiveTime::from_hms_opt(18, 0, 0)
        );
        assert_eq!(parse_clock("not a time"), None);
    }
}
