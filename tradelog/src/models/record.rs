use chrono::{DateTime, TimeZone, Utc};
use serde_json::{Number, Value};
use std::collections::BTreeMap;

pub type Payload = BTreeMap<String, PayloadValue>;

/// Timestamps below this are seconds since the epoch, at or above are milliseconds.
const MILLIS_THRESHOLD: f64 = 2e10;

/// Field names checked, in order, for a record's timestamp.
const TIMESTAMP_FIELDS: &[&str] = &["timestamp", "time", "t", "date"];

/// One value of a loosely structured log payload.
#[derive(Debug, Clone, PartialEq)]
pub enum PayloadValue {
    Text(String),
    Number(Number),
    Map(Payload),
    /// Booleans, arrays and nulls. Never matched against.
    Other(Value),
}

impl PayloadValue {
    pub fn from_json(value: &Value) -> Self {
        match value {
            Value::String(s) => Self::Text(s.clone()),
            Value::Number(n) => Self::Number(n.clone()),
            Value::Object(map) => Self::Map(
                map.iter()
                    .map(|(k, v)| (k.clone(), Self::from_json(v)))
                    .collect(),
            ),
            other => Self::Other(other.clone()),
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s.as_str()),
            _ => None,
        }
    }

    /// Render a scalar the way it would appear as an identifier.
    pub fn id_string(&self) -> Option<String> {
        match self {
            Self::Text(s) => Some(s.clone()),
            Self::Number(n) => Some(render_number(n)),
            _ => None,
        }
    }

    /// Non-empty text or a non-zero number.
    pub fn is_present(&self) -> bool {
        match self {
            Self::Text(s) => !s.is_empty(),
            Self::Number(n) => n.as_f64().is_some_and(|v| v != 0.0),
            _ => false,
        }
    }

    /// Text held by this value, or by its direct children when it is a map.
    pub fn texts(&self) -> Vec<&str> {
        match self {
            Self::Text(s) => vec![s.as_str()],
            Self::Map(inner) => inner.values().filter_map(PayloadValue::as_text).collect(),
            _ => Vec::new(),
        }
    }
}

fn render_number(n: &Number) -> String {
    if n.is_f64() {
        if let Some(v) = n.as_f64() {
            if v.fract() == 0.0 && v.abs() < 1e15 {
                return format!("{}", v as i64);
            }
        }
    }
    n.to_string()
}

fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(render_number(n)),
        _ => None,
    }
}

fn numeric(value: &Value) -> Option<f64> {
    let n = match value {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().parse::<f64>().ok()?,
        _ => return None,
    };
    (n.is_finite() && n != 0.0).then_some(n)
}

/// One entry of the remote activity log.
#[derive(Debug, Clone, PartialEq)]
pub struct RawRecord {
    /// Raw epoch value, seconds or milliseconds.
    pub timestamp: Option<f64>,
    pub category: Option<String>,
    pub title: Option<String>,
    pub event: Option<String>,
    pub action: Option<String>,
    pub description: Option<String>,
    /// Every top-level entry except `data`.
    pub fields: Payload,
    pub data: Payload,
}

impl RawRecord {
    /// Build a record from one log entry. Returns `None` for anything that is
    /// not a JSON object.
    pub fn from_json(value: &Value) -> Option<Self> {
        let obj = value.as_object()?;

        let text = |key: &str| obj.get(key).and_then(scalar_text);
        let timestamp = TIMESTAMP_FIELDS
            .iter()
            .find_map(|key| obj.get(*key).and_then(numeric));

        let fields = obj
            .iter()
            .filter(|(k, _)| k.as_str() != "data")
            .map(|(k, v)| (k.clone(), PayloadValue::from_json(v)))
            .collect();

        let data = match obj.get("data") {
            Some(Value::Object(map)) => map
                .iter()
                .map(|(k, v)| (k.clone(), PayloadValue::from_json(v)))
                .collect(),
            _ => Payload::new(),
        };

        Some(Self {
            timestamp,
            category: text("category"),
            title: text("title"),
            event: text("event"),
            action: text("action"),
            description: text("description"),
            fields,
            data,
        })
    }

    /// Timestamp normalized to whole seconds since the epoch.
    pub fn timestamp_secs(&self) -> Option<i64> {
        self.timestamp.map(|ts| {
            let secs = if ts < MILLIS_THRESHOLD { ts } else { ts / 1000.0 };
            secs.floor() as i64
        })
    }

    /// Derived UTC timestamp, when the raw value is a representable instant.
    pub fn occurred_at(&self) -> Option<DateTime<Utc>> {
        let ts = self.timestamp?;
        let millis = if ts < MILLIS_THRESHOLD { ts * 1000.0 } else { ts };
        Utc.timestamp_millis_opt(millis as i64).single()
    }

    /// Title, event, action and description, skipping absent ones.
    pub fn text_fields(&self) -> impl Iterator<Item = &str> {
        [&self.title, &self.event, &self.action, &self.description]
            .into_iter()
            .filter_map(|f| f.as_deref())
    }

    /// String values of the payload, including one nested level.
    pub fn payload_texts(&self) -> impl Iterator<Item = &str> {
        self.data.values().flat_map(PayloadValue::texts)
    }

    /// Look up a field by name at the top level or inside the payload.
    pub fn field_values<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a PayloadValue> {
        self.fields.get(name).into_iter().chain(self.data.get(name))
    }
}
