//! JSON body for one relayed sample
//!
//! The body is small and fixed-shape, so it is written with `core::fmt` into a
//! stack buffer instead of going through a serializer:
//!
//! ```text
//! {"class_name":7,"temperature":23.46,"humidity":48.10}
//! ```

use core::fmt::Write;

use heapless::String;
use thiserror_no_std::Error;

use crate::message::SensorMessage;

/// Body buffer size. The longest possible body is 139 bytes: an `i32::MIN`
/// id with both readings at `-f32::MAX` rendered to two decimals.
pub const JSON_BODY_CAPACITY: usize = 144;

pub type JsonBody = String<JSON_BODY_CAPACITY>;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormatError {
    #[error("{field} is not a finite number")]
    NonFinite { field: &'static str },
    #[error("body does not fit in {capacity} bytes")]
    Overflow { capacity: usize },
}

/// Render `message` as the JSON request body.
///
/// NaN and infinities have no JSON representation and are rejected.
pub fn format_reading(message: &SensorMessage) -> Result<JsonBody, FormatError> {
    ensure_finite("temperature", message.temperature)?;
    ensure_finite("humidity", message.humidity)?;

    let mut body = JsonBody::new();
    write!(
        body,
        "{{\"class_name\":{},\"temperature\":{:.2},\"humidity\":{:.2}}}",
        message.id, message.temperature, message.humidity
    )
    .map_err(|_| FormatError::Overflow {
        capacity: JSON_BODY_CAPACITY,
    })?;

    Ok(body)
}

fn ensure_finite(field: &'static str, value: f32) -> Result<(), FormatError> {
    if value.is_finite() {
        Ok(())
    } else {
        Err(FormatError::NonFinite { field })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reference_body() {
        let body = format_reading(&SensorMessage::new(7, 23.456, 48.1)).unwrap();
        assert_eq!(
            body.as_str(),
            r#"{"class_name":7,"temperature":23.46,"humidity":48.10}"#
        );
    }

    #[test]
    fn test_negative_values() {
        let body = format_reading(&SensorMessage::new(-1, -5.0, 0.004)).unwrap();
        assert_eq!(
            body.as_str(),
            r#"{"class_name":-1,"temperature":-5.00,"humidity":0.00}"#
        );
    }

    #[test]
    fn test_worst_case_fits() {
        let body = format_reading(&SensorMessage::new(i32::MIN, -f32::MAX, -f32::MAX)).unwrap();
        assert_eq!(body.len(), 139);
        assert!(body.starts_with(r#"{"class_name":-2147483648,"temperature":-3402823"#));
        assert!(body.ends_with(".00}"));
    }

    #[test]
    fn test_non_finite_is_rejected() {
        assert_eq!(
            format_reading(&SensorMessage::new(1, f32::NAN, 10.0)),
            Err(FormatError::NonFinite {
                field: "temperature"
            })
        );
        assert_eq!(
            format_reading(&SensorMessage::new(1, 10.0, f32::NEG_INFINITY)),
            Err(FormatError::NonFinite { field: "humidity" })
        );
    }
}
