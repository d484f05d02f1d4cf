//! Pairing challenges and their QR renderings.

use chrono::{DateTime, Utc};
use qrcode::render::svg;
use qrcode::{Color, QrCode};
use std::path::Path;
use wadriver_core::{Error, Result};

/// An out-of-band pairing token shown as a QR code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthChallenge {
    pub payload: String,
    pub issued_at: DateTime<Utc>,
    /// 1-based probe round that produced this challenge.
    pub attempt_index: u32,
}

impl AuthChallenge {
    pub fn new(payload: impl Into<String>, attempt_index: u32, issued_at: DateTime<Utc>) -> Self {
        Self {
            payload: payload.into(),
            issued_at,
            attempt_index,
        }
    }

    fn code(&self) -> Result<QrCode> {
        QrCode::new(self.payload.as_bytes())
            .map_err(|e| Error::Other(format!("Cannot encode pairing code: {}", e)))
    }

    pub fn to_svg(&self) -> Result<String> {
        Ok(self
            .code()?
            .render::<svg::Color>()
            .min_dimensions(256, 256)
            .dark_color(svg::Color("#000000"))
            .light_color(svg::Color("#ffffff"))
            .build())
    }

    /// High-contrast block rendering with a one-module quiet zone.
    pub fn to_terminal(&self) -> Result<String> {
        let code = self.code()?;
        let width = code.width();
        let colors = code.to_colors();
        let blank = "  ".repeat(width + 2);

        let mut out = String::new();
        out.push_str(&blank);
        out.push('\n');
        for row in colors.chunks(width) {
            out.push_str("  ");
            for module in row {
                out.push_str(if *module == Color::Dark { "██" } else { "  " });
            }
            out.push_str("  \n");
        }
        out.push_str(&blank);
        out.push('\n');
        Ok(out)
    }

    pub fn write_svg(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, self.to_svg()?)?;
        Ok(())
    }
}
