use image::{imageops, DynamicImage, ImageBuffer, ImageFormat, Luma};
use qrcode::{EcLevel, QrCode};
use std::io::Cursor;

/// QR error correction level
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCorrection {
    Low,
    Medium,
    Quartile,
    High,
}

impl From<ErrorCorrection> for EcLevel {
    fn from(level: ErrorCorrection) -> Self {
        match level {
            ErrorCorrection::Low => EcLevel::L,
            ErrorCorrection::Medium => EcLevel::M,
            ErrorCorrection::Quartile => EcLevel::Q,
            ErrorCorrection::High => EcLevel::H,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum EncodeError {
    #[error("QR encoder unavailable: {0}")]
    Unavailable(String),

    #[error("cannot encode data as QR code: {0}")]
    Data(String),

    #[error("cannot produce PNG: {0}")]
    Image(String),
}

/// Renders text as a PNG QR code
pub trait QrEncoder: Send + Sync {
    /// `pixel_scale` is the edge of one module in pixels, `margin` the quiet
    /// zone in modules
    fn encode(
        &self,
        text: &str,
        level: ErrorCorrection,
        pixel_scale: u32,
        margin: u32,
    ) -> Result<Vec<u8>, EncodeError>;
}

/// Grayscale PNG encoder backed by the `qrcode` and `image` crates
#[derive(Debug, Default, Clone, Copy)]
pub struct PngQrEncoder;

impl QrEncoder for PngQrEncoder {
    fn encode(
        &self,
        text: &str,
        level: ErrorCorrection,
        pixel_scale: u32,
        margin: u32,
    ) -> Result<Vec<u8>, EncodeError> {
        let scale = pixel_scale.max(1);

        let code = QrCode::with_error_correction_level(text.as_bytes(), level.into())
            .map_err(|e| EncodeError::Data(e.to_string()))?;

        // qrcode's own quiet zone is fixed at 4 modules, so draw without it
        // and pad to the requested margin
        let modules = code
            .render::<Luma<u8>>()
            .quiet_zone(false)
            .module_dimensions(scale, scale)
            .build();

        let pad = margin * scale;
        let mut canvas = ImageBuffer::from_pixel(
            modules.width() + pad * 2,
            modules.height() + pad * 2,
            Luma([255u8]),
        );
        imageops::overlay(&mut canvas, &modules, pad as i64, pad as i64);

        let mut buffer = Cursor::new(Vec::new());
        DynamicImage::ImageLuma8(canvas)
            .write_to(&mut buffer, ImageFormat::Png)
            .map_err(|e| EncodeError::Image(e.to_string()))?;

        Ok(buffer.into_inner())
    }
}
