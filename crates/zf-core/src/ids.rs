use core::fmt;

use crate::error::{CoreError, CoreResult};

/// Stable identifier of a zone, derived from its configured name.
///
/// - lowercase ASCII, digits and single underscores
/// - used as the key of the supervisor's demand book
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ZoneId(String);

impl ZoneId {
    /// Slugify a configured zone name ("Living Room" -> "living_room").
    pub fn from_name(name: &str) -> Self {
        let mut slug = String::with_capacity(name.len());
        for ch in name.chars().flat_map(char::to_lowercase) {
            if ch.is_ascii_alphanumeric() || ch == '_' {
                slug.push(ch);
            } else {
                slug.push('_');
            }
        }
        let mut collapsed = String::with_capacity(slug.len());
        for ch in slug.chars() {
            if ch == '_' && collapsed.ends_with('_') {
                continue;
            }
            collapsed.push(ch);
        }
        Self(collapsed.trim_matches('_').to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Human readable label ("living_room" -> "Living room").
    pub fn display_name(&self) -> String {
        let cleaned = self.0.replace(['_', '-'], " ");
        let cleaned = cleaned.trim();
        let mut chars = cleaned.chars();
        match chars.next() {
            Some(first) => first.to_uppercase().chain(chars).collect(),
            None => String::new(),
        }
    }
}

impl fmt::Debug for ZoneId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ZoneId({})", self.0)
    }
}

impl fmt::Display for ZoneId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Name of a host-side point (`domain.object`), e.g. `sensor.living_temp`.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(try_from = "String", into = "String"))]
pub struct PointId(String);

impl PointId {
    pub fn parse(raw: &str) -> CoreResult<Self> {
        let trimmed = raw.trim();
        let Some((domain, object)) = trimmed.split_once('.') else {
            return Err(CoreError::MalformedPoint {
                point: raw.to_string(),
                reason: "expected domain.object",
            });
        };
        if domain.is_empty() || object.is_empty() {
            return Err(CoreError::MalformedPoint {
                point: raw.to_string(),
                reason: "empty domain or object",
            });
        }
        if trimmed.chars().any(char::is_whitespace) {
            return Err(CoreError::MalformedPoint {
                point: raw.to_string(),
                reason: "whitespace in point id",
            });
        }
        Ok(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn domain(&self) -> &str {
        self.0.split_once('.').map(|(d, _)| d).unwrap_or_default()
    }
}

impl TryFrom<String> for PointId {
    type Error = CoreError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        PointId::parse(&value)
    }
}

impl From<PointId> for String {
    fn from(value: PointId) -> Self {
        value.0
    }
}

impl fmt::Debug for PointId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PointId({})", self.0)
    }
}

impl fmt::Display for PointId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Namespaces a circuit actuator may live in.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ActuatorDomain {
    InputBoolean,
    Switch,
}

impl ActuatorDomain {
    pub fn as_str(self) -> &'static str {
        match self {
            ActuatorDomain::InputBoolean => "input_boolean",
            ActuatorDomain::Switch => "switch",
        }
    }
}

/// A circuit point that has been checked against the recognised namespaces.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ActuatorPoint {
    pub domain: ActuatorDomain,
    pub point: PointId,
}

impl ActuatorPoint {
    pub fn parse(raw: &str) -> CoreResult<Self> {
        let point = PointId::parse(raw)?;
        let domain = match point.domain() {
            "input_boolean" => ActuatorDomain::InputBoolean,
            "switch" => ActuatorDomain::Switch,
            other => {
                return Err(CoreError::UnsupportedActuator {
                    point: raw.to_string(),
                    domain: other.to_string(),
                });
            }
        };
        Ok(Self { domain, point })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zone_id_slugifies_names() {
        assert_eq!(ZoneId::from_name("Living Room").as_str(), "living_room");
        assert_eq!(ZoneId::from_name("living-room").as_str(), "living_room");
        assert_eq!(ZoneId::from_name("__Bath  2__").as_str(), "bath_2");
    }

    #[test]
    fn zone_id_display_name_is_capitalised() {
        assert_eq!(ZoneId::from_name("living_room").display_name(), "Living room");
    }

    #[test]
    fn point_id_requires_domain_and_object() {
        assert!(PointId::parse("sensor.living").is_ok());
        assert!(PointId::parse("sensor").is_err());
        assert!(PointId::parse(".living").is_err());
        assert!(PointId::parse("sensor.").is_err());
        assert!(PointId::parse("sensor.living room").is_err());
    }

    #[test]
    fn actuator_namespaces() {
        let a = ActuatorPoint::parse("switch.zone_1").unwrap();
        assert_eq!(a.domain, ActuatorDomain::Switch);
        let b = ActuatorPoint::parse("input_boolean.zone_2").unwrap();
        assert_eq!(b.domain, ActuatorDomain::InputBoolean);

        let err = ActuatorPoint::parse("light.kitchen").unwrap_err();
        assert!(matches!(err, CoreError::UnsupportedActuator { .. }));
    }
}
