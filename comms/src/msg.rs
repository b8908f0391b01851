use std::{borrow::Cow, io};

use crate::{
    Deserialize, Serialize,
    rpc::{Image, ImageBatch, LabeledImage, Request, Response, TrainingMetrics},
};

type HeaderType = u32;
const HEADER_SIZE: usize = size_of::<HeaderType>();

const ERR_H: HeaderType = 0;
const REQUEST_H: HeaderType = 1;
const RESPONSE_H: HeaderType = 2;
const METRICS_H: HeaderType = 3;
const IMAGES_H: HeaderType = 4;

type MetaLenType = u32;
const META_LEN_SIZE: usize = size_of::<MetaLenType>();

/// The application layer message for the entire system.
#[derive(Debug, Clone, PartialEq)]
pub enum Msg {
    Request(Request),
    Response(Response),
    Metrics(TrainingMetrics),
    Images(ImageBatch),
    Err(String),
}

impl Msg {
    /// The message's kind, used for logging and mismatch reports.
    pub fn kind(&self) -> &'static str {
        match self {
            Msg::Request(_) => "request",
            Msg::Response(_) => "response",
            Msg::Metrics(_) => "data/metrics",
            Msg::Images(_) => "data/images",
            Msg::Err(_) => "err",
        }
    }

    fn buf_is_too_small<T>(size: usize, needed: usize) -> io::Result<T> {
        Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("The given buffer is too small {size}, must at least be {needed} bytes"),
        ))
    }

    fn invalid_kind<T>(kind: HeaderType) -> io::Result<T> {
        Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("Received an invalid message kind {kind}"),
        ))
    }
}

/// The json part of an image batch frame, pixels follow it back to back.
#[derive(serde::Serialize, serde::Deserialize)]
struct BatchMeta<'a> {
    step: u64,
    timestamp_ms: u64,
    #[serde(borrow)]
    images: Vec<ImageMeta<'a>>,
}

#[derive(serde::Serialize, serde::Deserialize)]
struct ImageMeta<'a> {
    width: u32,
    height: u32,
    #[serde(borrow)]
    format: Cow<'a, str>,
    #[serde(borrow)]
    ground_truth: Cow<'a, str>,
    #[serde(borrow)]
    prediction: Cow<'a, str>,
    confidence: f32,
    len: usize,
}

impl<'a> From<&'a ImageBatch> for BatchMeta<'a> {
    fn from(batch: &'a ImageBatch) -> Self {
        let images = batch
            .images
            .iter()
            .map(|labeled| ImageMeta {
                width: labeled.image.width,
                height: labeled.image.height,
                format: Cow::Borrowed(labeled.image.format.as_str()),
                ground_truth: Cow::Borrowed(labeled.ground_truth.as_str()),
                prediction: Cow::Borrowed(labeled.prediction.as_str()),
                confidence: labeled.confidence,
                len: labeled.image.pixel_data.len(),
            })
            .collect();

        Self {
            step: batch.step,
            timestamp_ms: batch.timestamp_ms,
            images,
        }
    }
}

fn serialize_images(batch: &ImageBatch, buf: &mut Vec<u8>) -> io::Result<()> {
    let meta_start = buf.len();
    buf.extend_from_slice(&[0; META_LEN_SIZE]);
    serde_json::to_writer(&mut *buf, &BatchMeta::from(batch))?;

    let meta_len = buf.len() - meta_start - META_LEN_SIZE;
    let meta_len = MetaLenType::try_from(meta_len)
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;
    buf[meta_start..meta_start + META_LEN_SIZE].copy_from_slice(&meta_len.to_be_bytes());

    for labeled in &batch.images {
        buf.extend_from_slice(&labeled.image.pixel_data);
    }

    Ok(())
}

fn deserialize_images(buf: &[u8]) -> io::Result<ImageBatch> {
    if buf.len() < META_LEN_SIZE {
        return Msg::buf_is_too_small(buf.len(), META_LEN_SIZE);
    }

    let (len_buf, rest) = buf.split_at(META_LEN_SIZE);
    let mut len_bytes = [0; META_LEN_SIZE];
    len_bytes.copy_from_slice(len_buf);
    let meta_len = MetaLenType::from_be_bytes(len_bytes) as usize;

    if rest.len() < meta_len {
        return Msg::buf_is_too_small(rest.len(), meta_len);
    }

    let (meta_buf, mut pixels) = rest.split_at(meta_len);
    let meta: BatchMeta = serde_json::from_slice(meta_buf)?;

    let mut images = Vec::with_capacity(meta.images.len());
    for image in meta.images {
        if pixels.len() < image.len {
            return Msg::buf_is_too_small(pixels.len(), image.len);
        }

        let (data, tail) = pixels.split_at(image.len);
        pixels = tail;

        images.push(LabeledImage {
            image: Image {
                pixel_data: data.to_vec(),
                width: image.width,
                height: image.height,
                format: image.format.into_owned(),
            },
            ground_truth: image.ground_truth.into_owned(),
            prediction: image.prediction.into_owned(),
            confidence: image.confidence,
        });
    }

    if !pixels.is_empty() {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("{} trailing pixel bytes after the last image", pixels.len()),
        ));
    }

    Ok(ImageBatch {
        step: meta.step,
        images,
        timestamp_ms: meta.timestamp_ms,
    })
}

impl Serialize for Msg {
    fn serialize(&self, buf: &mut Vec<u8>) -> io::Result<()> {
        match self {
            Msg::Err(e) => {
                buf.extend_from_slice(&ERR_H.to_be_bytes());
                buf.extend_from_slice(e.as_bytes());
            }
            Msg::Request(req) => {
                buf.extend_from_slice(&REQUEST_H.to_be_bytes());
                serde_json::to_writer(&mut *buf, req)?;
            }
            Msg::Response(res) => {
                buf.extend_from_slice(&RESPONSE_H.to_be_bytes());
                serde_json::to_writer(&mut *buf, res)?;
            }
            Msg::Metrics(metrics) => {
                buf.extend_from_slice(&METRICS_H.to_be_bytes());
                serde_json::to_writer(&mut *buf, metrics)?;
            }
            Msg::Images(batch) => {
                buf.extend_from_slice(&IMAGES_H.to_be_bytes());
                serialize_images(batch, buf)?;
            }
        }

        Ok(())
    }
}

impl Deserialize for Msg {
    fn deserialize(buf: &[u8]) -> io::Result<Self> {
        if buf.len() < HEADER_SIZE {
            return Self::buf_is_too_small(buf.len(), HEADER_SIZE);
        }

        let (kind_buf, rest) = buf.split_at(HEADER_SIZE);
        let mut kind_bytes = [0; HEADER_SIZE];
        kind_bytes.copy_from_slice(kind_buf);

        match HeaderType::from_be_bytes(kind_bytes) {
            ERR_H => {
                let text = str::from_utf8(rest)
                    .map_err(|err| io::Error::new(io::ErrorKind::InvalidData, err))?;

                Ok(Self::Err(text.to_string()))
            }
            REQUEST_H => Ok(Self::Request(serde_json::from_slice(rest)?)),
            RESPONSE_H => Ok(Self::Response(serde_json::from_slice(rest)?)),
            METRICS_H => Ok(Self::Metrics(serde_json::from_slice(rest)?)),
            IMAGES_H => Ok(Self::Images(deserialize_images(rest)?)),
            kind => Self::invalid_kind(kind),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rpc::{MetricsRequest, PingResponse};

    fn encode(msg: &Msg) -> Vec<u8> {
        let mut buf = Vec::new();
        msg.serialize(&mut buf).unwrap();
        buf
    }

    fn labeled(pixels: Vec<u8>, truth: &str, pred: &str) -> LabeledImage {
        LabeledImage {
            image: Image {
                pixel_data: pixels,
                width: 2,
                height: 1,
                format: "RGB".to_string(),
            },
            ground_truth: truth.to_string(),
            prediction: pred.to_string(),
            confidence: 0.75,
        }
    }

    #[test]
    fn test_image_batch_keeps_pixels_out_of_json() {
        let batch = ImageBatch {
            step: 7,
            images: vec![
                labeled(vec![1, 2, 3, 4, 5, 6], "cat", "dog"),
                labeled(vec![9; 6], "ship", "ship"),
            ],
            timestamp_ms: 1234,
        };

        let buf = encode(&Msg::Images(batch.clone()));
        assert!(buf.ends_with(&[1, 2, 3, 4, 5, 6, 9, 9, 9, 9, 9, 9]));

        match Msg::deserialize(&buf).unwrap() {
            Msg::Images(decoded) => assert_eq!(decoded, batch),
            other => panic!("unexpected msg: {other:?}"),
        }
    }

    #[test]
    fn test_control_messages_decode() {
        let req = Msg::Request(Request::StreamMetrics(MetricsRequest {
            update_interval_ms: 100,
            start_step: 3,
        }));
        assert_eq!(Msg::deserialize(&encode(&req)).unwrap(), req);

        let res = Msg::Response(Response::Ping(PingResponse {
            alive: true,
            timestamp_ms: 1,
            retry_count: 0,
            max_retries: 5,
        }));
        assert_eq!(Msg::deserialize(&encode(&res)).unwrap(), res);
    }

    #[test]
    fn test_truncated_pixels_are_rejected() {
        let batch = ImageBatch {
            step: 1,
            images: vec![labeled(vec![0; 6], "cat", "cat")],
            timestamp_ms: 0,
        };

        let mut buf = encode(&Msg::Images(batch));
        buf.truncate(buf.len() - 2);

        let err = Msg::deserialize(&buf).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }

    #[test]
    fn test_unknown_kind_is_rejected() {
        let buf = 99u32.to_be_bytes();
        let err = Msg::deserialize(&buf).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }

    #[test]
    fn test_short_buffer_is_rejected() {
        assert!(Msg::deserialize(&[0, 1]).is_err());
    }
}
