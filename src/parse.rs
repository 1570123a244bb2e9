use serde_json::{Map, Value};

use crate::{config::OutputFormat, Error, Result};

/// Decoded body of one query: a feature collection kept verbatim so it can be written back out
/// exactly as received.
#[derive(Debug, Clone)]
pub struct FeatureResponse {
    document: Value,
    format: OutputFormat,
}

impl FeatureResponse {
    /// Decodes a response body. ArcGIS reports query failures as `{"error": {...}}` with a 200
    /// status, those surface as `Error::Server`.
    pub fn decode(body: &[u8], format: OutputFormat) -> Result<Self> {
        let document: Value = serde_json::from_slice(body)?;
        Self::from_document(document, format)
    }

    pub fn from_document(document: Value, format: OutputFormat) -> Result<Self> {
        if let Some(err) = document.get("error") {
            return Err(Error::Server {
                code: err.get("code").and_then(Value::as_i64).unwrap_or_default(),
                message: err
                    .get("message")
                    .and_then(Value::as_str)
                    .unwrap_or("unknown error")
                    .to_string(),
            });
        }
        if !document.get("features").is_some_and(Value::is_array) {
            return Err(Error::MissingFeatures);
        }
        Ok(Self { document, format })
    }

    pub fn features(&self) -> &[Value] {
        self.document["features"]
            .as_array()
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    pub fn is_empty(&self) -> bool {
        self.features().is_empty()
    }

    /// Identifier of the last feature, the highest ID the server confirmed for this window.
    /// `None` for an empty response.
    pub fn last_id(&self, id_field: &str) -> Result<Option<u64>> {
        match self.features().last() {
            Some(feature) => feature_id(feature, self.format, id_field).map(Some),
            None => Ok(None),
        }
    }

    /// Pretty printed with a four space indent. Non-ASCII text is written as is.
    pub fn to_pretty_bytes(&self) -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
        let mut ser = serde_json::Serializer::with_formatter(&mut buf, formatter);
        serde::Serialize::serialize(&self.document, &mut ser)?;
        Ok(buf)
    }
}

/// Attribute map of a feature: `attributes` for Esri JSON, `properties` for GeoJSON.
pub fn feature_attributes(feature: &Value, format: OutputFormat) -> Option<&Map<String, Value>> {
    feature.get(format.attributes_key())?.as_object()
}

/// Numeric identifier of a feature. GeoJSON features may carry it only as the top level `id`.
pub fn feature_id(feature: &Value, format: OutputFormat, id_field: &str) -> Result<u64> {
    let from_attributes = feature_attributes(feature, format).and_then(|attrs| attrs.get(id_field));
    let value = match (from_attributes, format) {
        (Some(v), _) => Some(v),
        (None, OutputFormat::GeoJson) => feature.get("id"),
        (None, OutputFormat::Json) => None,
    };
    value
        .and_then(id_from_value)
        .ok_or_else(|| Error::MissingIdentifier(id_field.to_string()))
}

/// Accepts integers and integral floats, some servers send `12.0`.
pub(crate) fn id_from_value(value: &Value) -> Option<u64> {
    value.as_u64().or_else(|| {
        value
            .as_f64()
            .filter(|f| *f >= 0.0 && f.fract() == 0.0)
            .map(|f| f as u64)
    })
}
