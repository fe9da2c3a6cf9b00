//! 各报文种类的载荷解析。

use crate::RouteError;
use chrono::{DateTime, NaiveDateTime, Utc};
use domain::DeviceStatus;
use serde_json::{Map, Value};
use tracing::warn;

/// 传感器数据载荷。
#[derive(Debug, Clone, PartialEq)]
pub struct SensorDataPayload {
    pub value: f64,
    /// 上报的原始数值文本，写入 `last_value`。
    pub value_text: String,
    /// 读数时间（Unix 毫秒）；缺失或无法解析时取接收时间。
    pub ts_ms: i64,
    pub quality: String,
}

/// 设备状态载荷。
#[derive(Debug, Clone, PartialEq)]
pub struct StatusPayload {
    pub status: DeviceStatus,
    pub error: Option<String>,
}

/// 网关心跳载荷。
#[derive(Debug, Clone, PartialEq)]
pub struct HeartbeatPayload {
    pub uptime: Option<i64>,
}

fn as_object(body: &Value) -> Result<&Map<String, Value>, RouteError> {
    body.as_object().ok_or(RouteError::NotAnObject)
}

/// null 视为缺省。
fn field<'a>(object: &'a Map<String, Value>, name: &str) -> Option<&'a Value> {
    object.get(name).filter(|value| !value.is_null())
}

impl SensorDataPayload {
    pub(crate) fn parse(body: &Value, received_at_ms: i64) -> Result<Self, RouteError> {
        let object = as_object(body)?;
        let (value, value_text) = match field(object, "value") {
            None => return Err(RouteError::MissingValue),
            Some(Value::Number(number)) => {
                let value = number
                    .as_f64()
                    .ok_or_else(|| RouteError::InvalidValue(number.to_string()))?;
                (value, number.to_string())
            }
            Some(Value::String(text)) => {
                let trimmed = text.trim();
                let value = trimmed
                    .parse::<f64>()
                    .map_err(|_| RouteError::InvalidValue(text.clone()))?;
                (value, trimmed.to_string())
            }
            Some(other) => return Err(RouteError::InvalidValue(other.to_string())),
        };
        if !value.is_finite() {
            return Err(RouteError::InvalidValue(value_text));
        }
        let ts_ms = match field(object, "timestamp") {
            None => received_at_ms,
            Some(raw) => parse_timestamp_ms(raw).unwrap_or_else(|| {
                warn!(
                    target: "iot.router",
                    timestamp = %raw,
                    "timestamp_unparseable_using_receive_time"
                );
                received_at_ms
            }),
        };
        let quality = match field(object, "quality") {
            None => "good".to_string(),
            Some(Value::String(quality)) => quality.clone(),
            Some(other) => {
                return Err(RouteError::InvalidField {
                    field: "quality",
                    reason: format!("expected string, got {other}"),
                });
            }
        };
        Ok(Self {
            value,
            value_text,
            ts_ms,
            quality,
        })
    }
}

impl StatusPayload {
    pub(crate) fn parse(body: &Value) -> Result<Self, RouteError> {
        let object = as_object(body)?;
        let status = match field(object, "status") {
            None => return Err(RouteError::MissingField("status")),
            Some(Value::String(text)) => {
                DeviceStatus::parse(text).ok_or_else(|| RouteError::UnknownStatus(text.clone()))?
            }
            Some(other) => return Err(RouteError::UnknownStatus(other.to_string())),
        };
        let error = match field(object, "error") {
            None => None,
            Some(Value::String(text)) => Some(text.clone()),
            // 非字符串的错误描述按 JSON 文本保存
            Some(other) => Some(other.to_string()),
        };
        Ok(Self { status, error })
    }
}

impl HeartbeatPayload {
    pub(crate) fn parse(body: &Value) -> Result<Self, RouteError> {
        let object = as_object(body)?;
        let uptime = match field(object, "uptime") {
            None => None,
            Some(Value::Number(number)) => Some(
                number
                    .as_i64()
                    .or_else(|| number.as_f64().map(|value| value as i64))
                    .ok_or_else(|| RouteError::InvalidField {
                        field: "uptime",
                        reason: number.to_string(),
                    })?,
            ),
            Some(other) => {
                return Err(RouteError::InvalidField {
                    field: "uptime",
                    reason: format!("expected number, got {other}"),
                });
            }
        };
        Ok(Self { uptime })
    }
}

/// 时间戳：RFC 3339 字符串（允许 `Z`）、无时区的 ISO-8601（按 UTC）、或 Unix 秒（整数或小数）。
pub(crate) fn parse_timestamp_ms(raw: &Value) -> Option<i64> {
    match raw {
        Value::String(text) => {
            let text = text.trim();
            if let Ok(parsed) = DateTime::parse_from_rfc3339(text) {
                return Some(parsed.timestamp_millis());
            }
            ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"]
                .iter()
                .find_map(|format| NaiveDateTime::parse_from_str(text, format).ok())
                .map(|naive| naive.and_utc().timestamp_millis())
        }
        Value::Number(number) => {
            let seconds = number.as_f64()?;
            if !seconds.is_finite() {
                return None;
            }
            let millis = (seconds * 1000.0).round();
            DateTime::<Utc>::from_timestamp_millis(millis as i64).map(|dt| dt.timestamp_millis())
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::parse_timestamp_ms;
    use serde_json::json;

    #[test]
    fn parses_rfc3339_with_z_and_offset() {
        assert_eq!(
            parse_timestamp_ms(&json!("2023-11-14T22:13:20Z")),
            Some(1_700_000_000_000)
        );
        assert_eq!(
            parse_timestamp_ms(&json!("2023-11-15T06:13:20.5+08:00")),
            Some(1_700_000_000_500)
        );
    }

    #[test]
    fn parses_naive_iso_as_utc() {
        assert_eq!(
            parse_timestamp_ms(&json!("2023-11-14T22:13:20")),
            Some(1_700_000_000_000)
        );
    }

    #[test]
    fn parses_epoch_seconds() {
        assert_eq!(parse_timestamp_ms(&json!(1_700_000_000)), Some(1_700_000_000_000));
        assert_eq!(parse_timestamp_ms(&json!(1_700_000_000.25)), Some(1_700_000_000_250));
    }

    #[test]
    fn rejects_garbage() {
        assert_eq!(parse_timestamp_ms(&json!("yesterday")), None);
        assert_eq!(parse_timestamp_ms(&json!(true)), None);
    }
}
