//! Serialization: eye-catcher binary framing and a typed JSON wrapper.
//!
//! Binary layout per top-level object: an 8-byte eye-catcher, a u32
//! version, a u64 payload length, the bincode payload, and the eye-catcher
//! again as a footer. A missing or mismatched eye-catcher, a wrong
//! version, or a truncated payload all surface as [`Error::Io`].
//!
//! The JSON alternative wraps the object as `{"type": ..., "content": ...}`.
//!
//! The context itself serializes as its parameter set: contexts are rebuilt
//! deterministically from parameters, so the derived tables never travel.

use std::io::{Read, Write};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::ciphertext::Ciphertext;
use crate::error::{Error, Result};
use crate::keys::{PublicKey, SecretKey};
use crate::params::BgvParams;

/// Current framing version.
pub const FORMAT_VERSION: u32 = 1;

/// A type with an eye-catcher tag for binary framing.
pub trait Framed: Serialize + DeserializeOwned {
    /// The 8-byte eye-catcher written as header and footer.
    const EYE_CATCHER: &'static [u8; 8];
    /// The type label used by the JSON wrapper.
    const TYPE_NAME: &'static str;
}

impl Framed for BgvParams {
    const EYE_CATCHER: &'static [u8; 8] = b"BGVRCTX\0";
    const TYPE_NAME: &'static str = "Context";
}

impl Framed for SecretKey {
    const EYE_CATCHER: &'static [u8; 8] = b"BGVRSKY\0";
    const TYPE_NAME: &'static str = "SecretKey";
}

impl Framed for PublicKey {
    const EYE_CATCHER: &'static [u8; 8] = b"BGVRPKY\0";
    const TYPE_NAME: &'static str = "PublicKey";
}

impl Framed for Ciphertext {
    const EYE_CATCHER: &'static [u8; 8] = b"BGVRCPH\0";
    const TYPE_NAME: &'static str = "Ciphertext";
}

/// Writes one framed object.
pub fn write_framed<W: Write, T: Framed>(writer: &mut W, value: &T) -> Result<()> {
    let payload =
        bincode::serialize(value).map_err(|e| Error::Io(format!("encode failed: {}", e)))?;
    writer.write_all(T::EYE_CATCHER)?;
    writer.write_u32::<LittleEndian>(FORMAT_VERSION)?;
    writer.write_u64::<LittleEndian>(payload.len() as u64)?;
    writer.write_all(&payload)?;
    writer.write_all(T::EYE_CATCHER)?;
    Ok(())
}

/// Reads one framed object, verifying eye-catchers and version.
pub fn read_framed<R: Read, T: Framed>(reader: &mut R) -> Result<T> {
    let mut magic = [0u8; 8];
    reader.read_exact(&mut magic)?;
    if &magic != T::EYE_CATCHER {
        return Err(Error::Io(format!(
            "missing eye-catcher for {}: found {:?}",
            T::TYPE_NAME, magic
        )));
    }
    let version = reader.read_u32::<LittleEndian>()?;
    if version != FORMAT_VERSION {
        return Err(Error::Io(format!(
            "unsupported {} format version {}",
            T::TYPE_NAME, version
        )));
    }
    let len = reader.read_u64::<LittleEndian>()? as usize;
    let mut payload = vec![0u8; len];
    reader.read_exact(&mut payload)?;
    let value: T = bincode::deserialize(&payload)
        .map_err(|e| Error::Io(format!("corrupt {} payload: {}", T::TYPE_NAME, e)))?;
    let mut footer = [0u8; 8];
    reader.read_exact(&mut footer)?;
    if &footer != T::EYE_CATCHER {
        return Err(Error::Io(format!(
            "missing footer eye-catcher for {}",
            T::TYPE_NAME
        )));
    }
    Ok(value)
}

/// Serializes as the typed JSON wrapper `{"type": ..., "content": ...}`.
pub fn to_json<T: Framed>(value: &T) -> Result<String> {
    let wrapper = serde_json::json!({
        "type": T::TYPE_NAME,
        "content": value,
    });
    Ok(serde_json::to_string(&wrapper)?)
}

/// Deserializes from the typed JSON wrapper, checking the type label.
pub fn from_json<T: Framed>(text: &str) -> Result<T> {
    let wrapper: serde_json::Value = serde_json::from_str(text)?;
    let ty = wrapper
        .get("type")
        .and_then(|t| t.as_str())
        .ok_or_else(|| Error::Io("JSON wrapper has no type field".into()))?;
    if ty != T::TYPE_NAME {
        return Err(Error::Io(format!(
            "expected type {}, found {}",
            T::TYPE_NAME, ty
        )));
    }
    let content = wrapper
        .get("content")
        .ok_or_else(|| Error::Io("JSON wrapper has no content field".into()))?;
    Ok(serde_json::from_value(content.clone())?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::Context;
    use crate::math::GaussianSampler;

    fn setup() -> (Context, SecretKey, GaussianSampler) {
        let ctx = Context::new(BgvParams::split_m16_p17(2, 120)).unwrap();
        let mut sampler = GaussianSampler::with_seed(3.2, 404);
        let sk = SecretKey::generate(&ctx, &mut sampler);
        (ctx, sk, sampler)
    }

    #[test]
    fn test_params_roundtrip() {
        let params = BgvParams::split_m16_p17(2, 120);
        let mut buf = Vec::new();
        write_framed(&mut buf, &params).unwrap();
        let back: BgvParams = read_framed(&mut buf.as_slice()).unwrap();
        assert_eq!(back, params);
    }

    #[test]
    fn test_ciphertext_roundtrip_field_by_field() {
        let (ctx, sk, mut sampler) = setup();
        let m: Vec<i64> = vec![5, -6, 7, 0, 0, 0, 1, 2];
        let c = sk.encrypt(&m, &ctx, &mut sampler).unwrap();

        let mut buf = Vec::new();
        write_framed(&mut buf, &c).unwrap();
        let back: Ciphertext = read_framed(&mut buf.as_slice()).unwrap();

        assert_eq!(back.parts(), c.parts());
        assert_eq!(back.prime_set(), c.prime_set());
        assert_eq!(back.ptxt_space(), c.ptxt_space());
        assert_eq!(back.int_factor(), c.int_factor());
        assert_eq!(sk.decrypt(&back, &ctx).unwrap(), m);
    }

    #[test]
    fn test_secret_key_roundtrip() {
        let (_ctx, sk, _) = setup();
        let mut buf = Vec::new();
        write_framed(&mut buf, &sk).unwrap();
        let back: SecretKey = read_framed(&mut buf.as_slice()).unwrap();
        assert_eq!(back.poly(), sk.poly());
    }

    #[test]
    fn test_corrupt_eye_catcher() {
        let params = BgvParams::split_m16_p17(2, 120);
        let mut buf = Vec::new();
        write_framed(&mut buf, &params).unwrap();
        buf[0] ^= 0xff;
        let err = read_framed::<_, BgvParams>(&mut buf.as_slice()).unwrap_err();
        assert!(matches!(err, Error::Io(_)));
    }

    #[test]
    fn test_truncated_payload() {
        let params = BgvParams::split_m16_p17(2, 120);
        let mut buf = Vec::new();
        write_framed(&mut buf, &params).unwrap();
        buf.truncate(buf.len() - 12);
        let err = read_framed::<_, BgvParams>(&mut buf.as_slice()).unwrap_err();
        assert!(matches!(err, Error::Io(_)));
    }

    #[test]
    fn test_wrong_type_rejected() {
        let (_ctx, sk, _) = setup();
        let mut buf = Vec::new();
        write_framed(&mut buf, &sk).unwrap();
        // reading a SecretKey frame as a Ciphertext must fail on the magic
        let err = read_framed::<_, Ciphertext>(&mut buf.as_slice()).unwrap_err();
        assert!(matches!(err, Error::Io(_)));
    }

    #[test]
    fn test_json_wrapper_roundtrip() {
        let params = BgvParams::split_m16_p17(2, 120);
        let text = to_json(&params).unwrap();
        assert!(text.contains("\"type\":\"Context\""));
        let back: BgvParams = from_json(&text).unwrap();
        assert_eq!(back, params);

        // mismatched type label
        assert!(from_json::<SecretKey>(&text).is_err());
    }
}
