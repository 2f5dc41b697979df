use serde_json::{Map, Value};

use super::types::{EventKind, NotificationEvent};

/// Turn one raw frame into exactly one event.
///
/// Structured frames (JSON objects) are classified through the
/// discriminator table; everything else degrades to an `Unclassified`
/// plain-text event. Never fails, never drops a frame.
pub fn classify(frame: &str) -> NotificationEvent {
    let payload = match serde_json::from_str::<Value>(frame) {
        Ok(Value::Object(map)) => map,
        // A bare JSON string is the text itself, minus the quoting
        Ok(Value::String(text)) => return NotificationEvent::plain_text(text),
        _ => {
            tracing::debug!(len = frame.len(), "Frame is not a structured object");
            return NotificationEvent::plain_text(frame);
        }
    };

    let kind = payload
        .get("type")
        .and_then(Value::as_str)
        .map(EventKind::from_discriminator)
        .unwrap_or(EventKind::Unclassified);

    let text = derive_text(kind, &payload);
    NotificationEvent::structured(kind, text, payload)
}

/// Human-readable summary for a structured frame.
///
/// A `text` field on the payload always wins; otherwise the text is
/// synthesized per kind, falling back to the serialized payload.
fn derive_text(kind: EventKind, payload: &Map<String, Value>) -> String {
    if let Some(text) = payload.get("text").and_then(Value::as_str) {
        return text.to_string();
    }

    match kind {
        EventKind::CsvCompleted => csv_summary_text(payload),
        EventKind::UserCreated => "Nuevo usuario creado.".to_string(),
        EventKind::UserUpdated => "Usuario actualizado.".to_string(),
        EventKind::UserDeleted => "Usuario eliminado.".to_string(),
        EventKind::Unclassified => Value::Object(payload.clone()).to_string(),
    }
}

/// Synthesize the CSV import summary line from the frame's counters.
fn csv_summary_text(payload: &Map<String, Value>) -> String {
    // Older worker builds report under "status" instead of "summary"
    let summary = payload
        .get("summary")
        .or_else(|| payload.get("status"))
        .and_then(Value::as_object);

    let count = |key: &str| summary.and_then(|s| s.get(key)).and_then(Value::as_u64);

    let valid_rows = count("valid_rows").or_else(|| count("processed")).unwrap_or(0);
    let uplinks = count("inserted_uplinks").unwrap_or(0);
    let sounds = count("sound_rows").unwrap_or(0);

    format!(
        "CSV procesado: {} filas válidas, {} uplinks, {} sonidos.",
        valid_rows, uplinks, sounds
    )
}
