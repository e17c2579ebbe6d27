use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use qrcode_generator::QrCodeEcc;

use crate::utils::error::AppError;

const QR_SIZE_PX: usize = 300;

/// Render the verification URL as a PNG QR code.
pub fn generate_png(verify_url: &str) -> Result<Vec<u8>, AppError> {
    qrcode_generator::to_png_to_vec(verify_url, QrCodeEcc::Medium, QR_SIZE_PX)
        .map_err(|e| AppError::InternalServerError(format!("QR generation failed: {}", e)))
}

/// Data-URL form for clients that render the code inline.
pub fn to_data_url(png: &[u8]) -> String {
    format!("data:image/png;base64,{}", STANDARD.encode(png))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generates_png_bytes() {
        let png = generate_png("https://tickets.example.com/verify/abc").unwrap();
        assert_eq!(&png[..4], &[0x89, b'P', b'N', b'G']);
    }

    #[test]
    fn data_url_has_png_prefix() {
        let png = generate_png("https://tickets.example.com/verify/abc").unwrap();
        let url = to_data_url(&png);
        assert!(url.starts_with("data:image/png;base64,"));
        assert!(url.len() > 30);
    }
}
