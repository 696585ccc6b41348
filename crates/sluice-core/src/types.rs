use serde::{de::DeserializeOwned, Deserialize, Serialize};

/// An opaque payload carried through the engine
///
/// Run inputs, streamed elements, and terminal results are all data
/// packets. This is a wrapper around a JSON value with helper methods
/// for converting to and from typed values at the flow boundary.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct DataPacket {
    /// The inner JSON value
    pub value: serde_json::Value,
}

impl DataPacket {
    /// Create a new data packet from a JSON value
    #[inline]
    pub fn new(value: serde_json::Value) -> Self {
        Self { value }
    }

    /// Create a null data packet
    #[inline]
    pub fn null() -> Self {
        Self {
            value: serde_json::Value::Null,
        }
    }

    /// Get the inner JSON value
    #[inline]
    pub fn as_value(&self) -> &serde_json::Value {
        &self.value
    }

    /// Take ownership of the inner JSON value
    #[inline]
    pub fn into_value(self) -> serde_json::Value {
        self.value
    }

    /// Check if the data packet is null
    #[inline]
    pub fn is_null(&self) -> bool {
        self.value.is_null()
    }

    /// Try to view the data packet as a string
    #[inline]
    pub fn as_str(&self) -> Option<&str> {
        self.value.as_str()
    }

    /// Try to convert the data packet to a specific type
    pub fn to<T>(&self) -> Result<T, serde_json::Error>
    where
        T: DeserializeOwned,
    {
        serde_json::from_value(self.value.clone())
    }

    /// Create a data packet from a serializable value
    pub fn from<T>(value: &T) -> Result<Self, serde_json::Error>
    where
        T: Serialize,
    {
        Ok(Self::new(serde_json::to_value(value)?))
    }

    /// Create a data packet holding a plain string
    #[inline]
    pub fn from_string(s: &str) -> Self {
        Self::new(serde_json::Value::String(s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_null_packet() {
        let packet = DataPacket::null();
        assert!(packet.is_null());
        assert_eq!(packet.as_value(), &serde_json::Value::Null);
    }

    #[test]
    fn test_string_packet() {
        let packet = DataPacket::from_string("hello");
        assert_eq!(packet.as_str(), Some("hello"));
        assert!(!packet.is_null());
    }

    #[test]
    fn test_typed_round_trip() {
        #[derive(Serialize, Deserialize, PartialEq, Debug)]
        struct Payload {
            msg: String,
            count: u32,
        }

        let original = Payload {
            msg: "x".to_string(),
            count: 3,
        };

        let packet = DataPacket::from(&original).unwrap();
        let back: Payload = packet.to().unwrap();
        assert_eq!(back, original);
    }

    #[test]
    fn test_to_mismatched_type_fails() {
        let packet = DataPacket::new(json!({"msg": "x"}));
        let result: Result<Vec<u32>, _> = packet.to();
        assert!(result.is_err());
    }

    #[test]
    fn test_into_value() {
        let packet = DataPacket::new(json!({"a": 1}));
        assert_eq!(packet.into_value(), json!({"a": 1}));
    }
}
