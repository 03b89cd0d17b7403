//! Canvas presentation

use nes_shell::DisplaySurface;
use wasm_bindgen::{Clamped, JsCast};
use web_sys::{CanvasRenderingContext2d, HtmlCanvasElement, ImageData};

use crate::{console_warn, js_error_message, WebError};

/// 2D context of the target canvas.
pub(crate) struct CanvasSurface {
    context: CanvasRenderingContext2d,
}

impl CanvasSurface {
    pub(crate) fn new(canvas: &HtmlCanvasElement) -> Result<Self, WebError> {
        let context = canvas
            .get_context("2d")
            .map_err(|e| WebError::js("getting canvas context", &e))?
            .ok_or(WebError::Missing("2d canvas context"))?
            .dyn_into::<CanvasRenderingContext2d>()
            .map_err(|e| WebError::js("unexpected canvas context", &e))?;
        Ok(CanvasSurface { context })
    }
}

impl DisplaySurface for CanvasSurface {
    fn present(&mut self, rgba: &[u8], width: u32, height: u32) {
        let image = match ImageData::new_with_u8_clamped_array_and_sh(Clamped(rgba), width, height)
        {
            Ok(image) => image,
            Err(e) => {
                console_warn!("Failed to build ImageData: {}", js_error_message(&e));
                return;
            }
        };
        if let Err(e) = self.context.put_image_data(&image, 0.0, 0.0) {
            console_warn!("Failed to draw frame: {}", js_error_message(&e));
        }
    }
}
