use anyhow::{Context, Result, anyhow};
use base64::alphabet;
use base64::engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig};
use base64::Engine as _;
use chrono::{DateTime, Local, Utc};

/// URL-safe base64 that accepts payloads with or without `=` padding.
const URL_SAFE_LENIENT: GeneralPurpose = GeneralPurpose::new(
    &alphabet::URL_SAFE,
    GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

/// Which clock a message timestamp is rendered in.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DateZone {
    #[default]
    Local,
    Utc,
}

/// Render provider epoch milliseconds as `YYYY-MM-DD`.
pub fn format_date(epoch_ms: i64, zone: DateZone) -> Result<String> {
    let utc: DateTime<Utc> = DateTime::from_timestamp_millis(epoch_ms)
        .ok_or_else(|| anyhow!("timestamp {epoch_ms} ms is out of range"))?;
    Ok(match zone {
        DateZone::Utc => utc.format("%Y-%m-%d").to_string(),
        DateZone::Local => utc.with_timezone(&Local).format("%Y-%m-%d").to_string(),
    })
}

/// Decode base64url data as served by the Gmail API.
pub fn decode_base64url(data: &str) -> Result<Vec<u8>> {
    URL_SAFE_LENIENT
        .decode(data.trim())
        .context("unable to decode base64url data")
}

/// Decode RFC 2047 encoded-words left in a header value.
pub fn decode_mime_words(raw: &str) -> String {
    if !raw.contains("=?") {
        return raw.to_string();
    }
    // mailparse expects a full "Key: value" header line
    let mut line = b"X: ".to_vec();
    line.extend_from_slice(raw.as_bytes());
    line.extend_from_slice(b"\r\n");

    match mailparse::parse_header(&line) {
        Ok((h, _idx)) => h.get_value(),
        Err(_) => raw.to_string(),
    }
}
