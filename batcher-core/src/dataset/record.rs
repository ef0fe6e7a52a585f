// batcher-core/src/dataset/record.rs

//! Raw article/abstract records.
//!
//! Each frame payload is a serialized `tf.train.Example` protobuf whose
//! `article` and `abstract` features hold one UTF-8 byte string each. The
//! abstract text carries its sentence boundaries inline as `<s> ... </s>`.

use std::collections::HashMap;
use std::io::{self, Write};

use prost::Message;

use super::framing::LengthPrefixedFormat;
use crate::error::{BatcherError, Result};

/// Marker opening an abstract sentence.
pub const SENTENCE_START: &str = "<s>";
/// Marker closing an abstract sentence.
pub const SENTENCE_END: &str = "</s>";

const ARTICLE_FEATURE: &str = "article";
const ABSTRACT_FEATURE: &str = "abstract";

/// `tf.train.Example`.
#[derive(Clone, PartialEq, Message)]
pub struct TfExample {
    #[prost(message, optional, tag = "1")]
    pub features: Option<Features>,
}

/// `tf.train.Features`.
#[derive(Clone, PartialEq, Message)]
pub struct Features {
    #[prost(map = "string, message", tag = "1")]
    pub feature: HashMap<String, Feature>,
}

/// `tf.train.Feature`.
#[derive(Clone, PartialEq, Message)]
pub struct Feature {
    #[prost(oneof = "feature::Kind", tags = "1, 2, 3")]
    pub kind: Option<feature::Kind>,
}

pub mod feature {
    #[derive(Clone, PartialEq, prost::Oneof)]
    pub enum Kind {
        #[prost(message, tag = "1")]
        BytesList(super::BytesList),
        #[prost(message, tag = "2")]
        FloatList(super::FloatList),
        #[prost(message, tag = "3")]
        Int64List(super::Int64List),
    }
}

#[derive(Clone, PartialEq, Message)]
pub struct BytesList {
    #[prost(bytes = "vec", repeated, tag = "1")]
    pub value: Vec<Vec<u8>>,
}

#[derive(Clone, PartialEq, Message)]
pub struct FloatList {
    #[prost(float, repeated, tag = "1")]
    pub value: Vec<f32>,
}

#[derive(Clone, PartialEq, Message)]
pub struct Int64List {
    #[prost(int64, repeated, tag = "1")]
    pub value: Vec<i64>,
}

/// One decoded (article, abstract) pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawRecord {
    pub article: String,
    /// Abstract text with its `<s>`/`</s>` markers still in place.
    pub abstract_text: String,
}

impl RawRecord {
    /// Decodes a frame payload.
    ///
    /// # Errors
    ///
    /// Returns a `Record` error if the protobuf is malformed or either
    /// feature is missing, not a byte list, empty, or not valid UTF-8.
    pub fn decode(payload: &[u8]) -> Result<Self> {
        let example = TfExample::decode(payload)
            .map_err(|e| BatcherError::record(format!("invalid tf.Example: {e}")))?;
        let features = example
            .features
            .ok_or_else(|| BatcherError::record("tf.Example has no features"))?;

        Ok(Self {
            article: bytes_feature(&features, ARTICLE_FEATURE)?,
            abstract_text: bytes_feature(&features, ABSTRACT_FEATURE)?,
        })
    }

    /// Serializes this record back into a `tf.train.Example` payload.
    pub fn encode(&self) -> Vec<u8> {
        let mut feature = HashMap::new();
        feature.insert(ARTICLE_FEATURE.to_string(), bytes_value(&self.article));
        feature.insert(ABSTRACT_FEATURE.to_string(), bytes_value(&self.abstract_text));

        TfExample {
            features: Some(Features { feature }),
        }
        .encode_to_vec()
    }

    /// Writes this record as one length-prefixed frame.
    pub fn write_framed<W: Write>(&self, writer: &mut W) -> io::Result<()> {
        LengthPrefixedFormat::new().write_frame(writer, &self.encode())
    }

    /// The abstract split into trimmed sentences.
    pub fn abstract_sentences(&self) -> Vec<String> {
        split_sentences(&self.abstract_text)
            .into_iter()
            .map(|s| s.trim().to_string())
            .collect()
    }
}

fn bytes_value(text: &str) -> Feature {
    Feature {
        kind: Some(feature::Kind::BytesList(BytesList {
            value: vec![text.as_bytes().to_vec()],
        })),
    }
}

fn bytes_feature(features: &Features, name: &str) -> Result<String> {
    let value = match features.feature.get(name).and_then(|f| f.kind.as_ref()) {
        Some(feature::Kind::BytesList(list)) => list.value.first(),
        Some(_) => {
            return Err(BatcherError::record(format!(
                "feature '{name}' is not a bytes list"
            )))
        }
        None => None,
    };
    let bytes = value.ok_or_else(|| BatcherError::record(format!("missing feature '{name}'")))?;

    String::from_utf8(bytes.clone())
        .map_err(|e| BatcherError::record(format!("feature '{name}' is not UTF-8: {e}")))
}

/// Splits abstract text into the sentences between `<s>` and `</s>` pairs.
///
/// Scanning stops at the first start marker without a matching end marker,
/// so malformed text yields a shorter list rather than an error.
pub fn split_sentences(text: &str) -> Vec<&str> {
    let mut sentences = Vec::new();
    let mut cursor = 0;

    while let Some(start) = text[cursor..].find(SENTENCE_START) {
        let body_start = cursor + start + SENTENCE_START.len();
        let Some(end) = text[body_start..].find(SENTENCE_END) else {
            break;
        };
        let body_end = body_start + end;
        sentences.push(&text[body_start..body_end]);
        cursor = body_end + SENTENCE_END.len();
    }

    sentences
}
