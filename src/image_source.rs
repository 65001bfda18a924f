//! Resolving image locators to orientation-corrected pixel buffers.

use std::{
    fs,
    io::Cursor,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use image::{ImageDecoder, ImageReader, ImageResult, imageops, metadata::Orientation};
use reqwest::Url;

use crate::types::PixelBuffer;

/// Where an image's bytes come from.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Locator {
    File(PathBuf),
    Http(String),
}

impl Locator {
    /// `file://` URIs and bare paths read from disk, `http(s)://` is fetched.
    /// Anything else is attempted as a filesystem path.
    pub fn parse(locator: &str) -> Self {
        if let Some(path) = locator.strip_prefix("file://") {
            // Percent-decoded, `localhost` accepted as the host.
            if let Some(path) = Url::parse(locator)
                .ok()
                .and_then(|url| url.to_file_path().ok())
            {
                return Locator::File(path);
            }
            let path = path.strip_prefix("localhost").unwrap_or(path);
            return Locator::File(PathBuf::from(path));
        }
        if locator.starts_with("http://") || locator.starts_with("https://") {
            return Locator::Http(locator.to_string());
        }
        Locator::File(PathBuf::from(locator))
    }
}

/// Raw, still encoded image bytes together with where they were read from.
#[derive(Clone, Debug)]
pub struct EncodedImage {
    pub locator: String,
    pub bytes: Vec<u8>,
}

pub fn fetch(locator: &str) -> Result<EncodedImage> {
    let bytes = match Locator::parse(locator) {
        Locator::File(path) => read_file(&path)?,
        Locator::Http(url) => read_http(&url)?,
    };
    Ok(EncodedImage {
        locator: locator.to_string(),
        bytes,
    })
}

fn read_file(path: &Path) -> Result<Vec<u8>> {
    fs::read(path).with_context(|| format!("failed to read {}", path.display()))
}

fn read_http(url: &str) -> Result<Vec<u8>> {
    let response = reqwest::blocking::get(url)
        .with_context(|| format!("failed to request {url}"))?
        .error_for_status()
        .with_context(|| format!("{url} returned error status"))?;
    let bytes = response
        .bytes()
        .with_context(|| format!("failed to read body of {url}"))?;
    Ok(bytes.to_vec())
}

pub fn decode(encoded: &EncodedImage) -> Result<PixelBuffer> {
    let image = ImageReader::new(Cursor::new(encoded.bytes.as_slice()))
        .with_guessed_format()
        .context("failed to sniff image format")?
        .decode()
        .with_context(|| format!("failed to decode {}", encoded.locator))?;
    Ok(PixelBuffer::new(image.to_rgba8()))
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Rotation {
    None,
    Clockwise90,
    Clockwise180,
    Clockwise270,
}

impl From<Orientation> for Rotation {
    /// Flipped orientations are left alone.
    fn from(orientation: Orientation) -> Self {
        match orientation {
            Orientation::Rotate90 => Rotation::Clockwise90,
            Orientation::Rotate180 => Rotation::Clockwise180,
            Orientation::Rotate270 => Rotation::Clockwise270,
            _ => Rotation::None,
        }
    }
}

pub fn rotate(buffer: PixelBuffer, rotation: Rotation) -> PixelBuffer {
    match rotation {
        Rotation::None => buffer,
        Rotation::Clockwise90 => PixelBuffer::new(imageops::rotate90(buffer.image())),
        Rotation::Clockwise180 => PixelBuffer::new(imageops::rotate180(buffer.image())),
        Rotation::Clockwise270 => PixelBuffer::new(imageops::rotate270(buffer.image())),
    }
}

fn read_orientation(bytes: &[u8]) -> ImageResult<Orientation> {
    let mut decoder = ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()?
        .into_decoder()?;
    decoder.orientation()
}

/// Applies the EXIF rotation of `encoded`. Never fails: unreadable metadata
/// leaves the buffer as it is.
pub fn correct_orientation(buffer: PixelBuffer, encoded: &EncodedImage) -> PixelBuffer {
    match read_orientation(&encoded.bytes) {
        Ok(orientation) => {
            let rotation = Rotation::from(orientation);
            if rotation != Rotation::None {
                log::debug!("rotating {} by {rotation:?}", encoded.locator);
            }
            rotate(buffer, rotation)
        }
        Err(err) => {
            log::debug!(
                "ignoring unreadable orientation of {}: {err}",
                encoded.locator
            );
            buffer
        }
    }
}

pub fn load(locator: &str) -> Result<PixelBuffer> {
    let encoded = fetch(locator)?;
    let buffer = decode(&encoded)?;
    Ok(correct_orientation(buffer, &encoded))
}
