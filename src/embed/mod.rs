//! Embedded static resources.
//!
//! ```ignore
//! use embed::serve::{HOTRELOAD_JS, HotreloadVars};
//!
//! let js = HOTRELOAD_JS.render(&HotreloadVars { ws_port: 35729 });
//! ```

mod template;

pub use template::{Template, TemplateVars};

pub mod serve {
    use super::{Template, TemplateVars};

    /// URL the dev server answers with the rendered reload client.
    pub const HOTRELOAD_URL: &str = "/__sapl/hotreload.js";

    pub struct HotreloadVars {
        pub ws_port: u16,
    }

    impl TemplateVars for HotreloadVars {
        fn apply(&self, content: &str) -> String {
            content.replace("__SAPL_WS_PORT__", &self.ws_port.to_string())
        }
    }

    /// Live reload client with WebSocket port injection.
    pub const HOTRELOAD_JS: Template<HotreloadVars> =
        Template::new(include_str!("serve/hotreload.js"));

    /// `<script>` tag loading [`HOTRELOAD_JS`].
    pub fn hotreload_tag() -> String {
        format!(r#"<script src="{HOTRELOAD_URL}"></script>"#)
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        #[test]
        fn test_port_injected() {
            let js = HOTRELOAD_JS.render(&HotreloadVars { ws_port: 35730 });
            assert!(js.contains("var port = 35730;"));
            assert!(!js.contains("__SAPL_WS_PORT__"));
        }
    }
}
