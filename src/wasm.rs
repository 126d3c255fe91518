use anyhow::{anyhow, Context, Result};
use wasm_bindgen::prelude::*;
use wasm_bindgen::JsCast;
use web_sys::{HtmlCanvasElement, WebGlRenderingContext};

use crate::capability::RawProbeSignal;
use crate::config::ViewerConfig;
use crate::material::{MaterialVariant, ParamsOnlyFactory};
use crate::probe::CapabilityProbe;
use crate::scene::{demo_ring, JsonSceneProvider, SceneAssetProvider};
use crate::session::ViewerSession;

/// `UNMASKED_RENDERER_WEBGL` from `WEBGL_debug_renderer_info`.
const UNMASKED_RENDERER_WEBGL: u32 = 0x9246;

/// Route panics and `log` output to the browser console.
#[wasm_bindgen]
pub fn init_panic_hook() {
    console_error_panic_hook::set_once();
    let _ = console_log::init_with_level(log::Level::Info);
}

/// Samples the browser window, user agent and a throwaway WebGL context.
struct WebProbe;

fn js_err(e: JsValue) -> anyhow::Error {
    anyhow!("{:?}", e)
}

impl WebProbe {
    fn webgl_signals(document: &web_sys::Document) -> Result<(Option<String>, Option<u32>)> {
        let canvas: HtmlCanvasElement = document
            .create_element("canvas")
            .map_err(js_err)?
            .dyn_into()
            .map_err(|_| anyhow!("canvas element has unexpected type"))?;
        let Some(context) = canvas.get_context("webgl").map_err(js_err)? else {
            return Ok((None, None));
        };
        let gl: WebGlRenderingContext = context
            .dyn_into()
            .map_err(|_| anyhow!("webgl context has unexpected type"))?;

        let has_debug_info = gl
            .get_extension("WEBGL_debug_renderer_info")
            .map_err(js_err)?
            .is_some();
        let renderer_param = if has_debug_info {
            UNMASKED_RENDERER_WEBGL
        } else {
            WebGlRenderingContext::RENDERER
        };
        let renderer = gl.get_parameter(renderer_param).map_err(js_err)?.as_string();
        let max_texture_size = gl
            .get_parameter(WebGlRenderingContext::MAX_TEXTURE_SIZE)
            .map_err(js_err)?
            .as_f64()
            .map(|v| v as u32);
        Ok((renderer, max_texture_size))
    }
}

impl CapabilityProbe for WebProbe {
    fn probe(&self) -> Result<RawProbeSignal> {
        let window = web_sys::window().context("no window")?;
        let width = window
            .inner_width()
            .map_err(js_err)?
            .as_f64()
            .context("innerWidth is not a number")? as u32;
        let user_agent = window.navigator().user_agent().ok();
        let is_mobile_ua = user_agent
            .as_deref()
            .is_some_and(|ua| ua.to_ascii_lowercase().contains("mobi"));

        let (renderer, max_texture_size) = match window.document() {
            Some(document) => Self::webgl_signals(&document).unwrap_or_else(|e| {
                log::warn!("WebGL probe failed: {:#}", e);
                (None, None)
            }),
            None => (None, None),
        };

        Ok(RawProbeSignal {
            width,
            renderer,
            max_texture_size,
            is_mobile_ua,
            user_agent,
        })
    }
}

/// Browser-facing viewer session.
#[wasm_bindgen]
pub struct WasmShowcase {
    session: ViewerSession<ParamsOnlyFactory>,
}

#[wasm_bindgen]
impl WasmShowcase {
    /// `config_json` may be empty for defaults; `scene_json` is a JSON array
    /// of scene nodes, or empty for the demo ring.
    #[wasm_bindgen(constructor)]
    pub fn new(config_json: &str, scene_json: &str) -> Result<WasmShowcase, JsValue> {
        let build = || -> Result<WasmShowcase> {
            let config = if config_json.trim().is_empty() {
                ViewerConfig::default()
            } else {
                ViewerConfig::from_json_str(config_json)?
            };
            let scene: Box<dyn SceneAssetProvider> = if scene_json.trim().is_empty() {
                Box::new(demo_ring())
            } else {
                Box::new(JsonSceneProvider::from_json_str(scene_json)?)
            };
            let session = ViewerSession::new(config, &WebProbe, scene.as_ref(), ParamsOnlyFactory::new())?;
            Ok(WasmShowcase { session })
        };
        build().map_err(|e| JsValue::from_str(&format!("{:#}", e)))
    }

    /// Queue a scroll offset in CSS pixels (`window.scrollY`).
    pub fn on_scroll(&mut self, offset: f64) {
        self.session.on_scroll(offset as i64);
    }

    /// Queue a viewport resize (`innerWidth`, `innerHeight`).
    pub fn on_resize(&mut self, width: u32, height: u32) {
        self.session.on_resize(width, height);
    }

    /// Advance one frame. Returns the frame as JSON, or `None` after teardown.
    pub fn frame(&mut self) -> Option<String> {
        let out = self.session.frame()?;
        match serde_json::to_string(&out) {
            Ok(json) => Some(json),
            Err(e) => {
                log::error!("Failed to serialise frame: {}", e);
                None
            }
        }
    }

    /// Select a material variant by name, e.g. `"rose_gold"`. Returns whether
    /// anything changed; unknown names are logged and ignored.
    pub fn set_variant(&mut self, name: &str) -> bool {
        match name.parse::<MaterialVariant>() {
            Ok(variant) => self.session.set_variant(variant),
            Err(e) => {
                log::warn!("{}", e);
                false
            }
        }
    }

    /// Capability signature as JSON.
    pub fn signature_json(&self) -> String {
        serde_json::to_string(&self.session.signature()).unwrap_or_default()
    }

    /// Release all materials. Later frames return `None`.
    pub fn teardown(&mut self) {
        self.session.teardown();
    }
}
