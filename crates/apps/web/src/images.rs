//! Image decoding through the browser: the element decodes, a scratch 2D
//! canvas reads the pixels back as RGBA.

use gpu::TextureData;
use wasm_bindgen::JsCast;
use wasm_bindgen::prelude::*;
use wasm_bindgen_futures::JsFuture;
use web_sys::{CanvasRenderingContext2d, HtmlCanvasElement, HtmlImageElement};

fn describe(src: &str, err: JsValue) -> String {
    match err.as_string() {
        Some(msg) => format!("{src}: {msg}"),
        None => format!("{src}: {err:?}"),
    }
}

pub async fn decode(src: &str) -> Result<TextureData, String> {
    let img = HtmlImageElement::new().map_err(|e| describe(src, e))?;
    img.set_cross_origin(Some("anonymous"));
    img.set_src(src);
    JsFuture::from(img.decode())
        .await
        .map_err(|e| describe(src, e))?;

    let (width, height) = (img.natural_width(), img.natural_height());
    if width == 0 || height == 0 {
        return Err(format!("{src}: empty image"));
    }

    let document = web_sys::window()
        .and_then(|w| w.document())
        .ok_or_else(|| format!("{src}: document missing"))?;
    let canvas = document
        .create_element("canvas")
        .and_then(|el| el.dyn_into::<HtmlCanvasElement>().map_err(JsValue::from))
        .map_err(|e| describe(src, e))?;
    canvas.set_width(width);
    canvas.set_height(height);
    let ctx = canvas
        .get_context("2d")
        .map_err(|e| describe(src, e))?
        .ok_or_else(|| format!("{src}: 2d context unavailable"))?
        .dyn_into::<CanvasRenderingContext2d>()
        .map_err(|e| describe(src, e.into()))?;
    ctx.draw_image_with_html_image_element(&img, 0.0, 0.0)
        .map_err(|e| describe(src, e))?;
    let pixels = ctx
        .get_image_data(0.0, 0.0, f64::from(width), f64::from(height))
        .map_err(|e| describe(src, e))?;
    Ok(TextureData::new(width, height, pixels.data().0))
}
