//! Anti-fingerprinting for the automated browser.
//!
//! Launch flags alone no longer hide automation; the bulk of the work happens
//! in a script injected before any site code runs on every new document.

/// Chromium launch arguments that reduce automation fingerprints.
pub(crate) fn launch_args() -> Vec<String> {
    vec![
        "--disable-blink-features=AutomationControlled".into(),
        "--disable-infobars".into(),
        "--no-first-run".into(),
        "--no-default-browser-check".into(),
        "--exclude-switches=enable-automation".into(),
    ]
}

/// Builds the stealth script injected on every new document.
///
/// Overrides the `navigator` surface the automation runtime alters
/// (webdriver flag, plugins, languages), fills in the `chrome.runtime`
/// object headless builds omit, and spoofs the WebGL vendor strings that
/// expose software rendering.
pub(crate) fn stealth_script(user_agent: Option<&str>) -> String {
    let mut script = String::from(
        r"
Object.defineProperty(navigator, 'webdriver', { get: () => false, configurable: true });
Object.defineProperty(navigator, 'languages', { get: () => ['en-US', 'en'], configurable: true });
Object.defineProperty(navigator, 'plugins', { get: () => [1, 2, 3, 4, 5], configurable: true });

if (!window.chrome) { window.chrome = {}; }
if (!window.chrome.runtime) {
    window.chrome.runtime = {
        connect: function() { return { onDisconnect: { addListener: function() {} }, postMessage: function() {} }; },
        sendMessage: function() {},
        onMessage: { addListener: function() {}, removeListener: function() {} },
    };
}

const getParameter = WebGLRenderingContext.prototype.getParameter;
WebGLRenderingContext.prototype.getParameter = function(parameter) {
    if (parameter === 37445) return 'Intel Inc.';
    if (parameter === 37446) return 'Intel Iris OpenGL Engine';
    return getParameter.apply(this, arguments);
};

const originalQuery = window.navigator.permissions && window.navigator.permissions.query;
if (originalQuery) {
    window.navigator.permissions.query = (parameters) => (
        parameters.name === 'notifications'
            ? Promise.resolve({ state: Notification.permission })
            : originalQuery(parameters)
    );
}
",
    );

    if let Some(ua) = user_agent {
        let ua_json = serde_json::to_string(ua).unwrap_or_else(|_| "\"\"".to_string());
        script.push_str(&format!(
            "Object.defineProperty(navigator, 'userAgent', {{ get: () => {ua_json}, configurable: true }});\n"
        ));
    }

    script
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_launch_args_disable_automation_hints() {
        let args = launch_args();
        assert!(args
            .iter()
            .any(|a| a.contains("AutomationControlled")));
    }

    #[test]
    fn test_stealth_script_overrides_webdriver() {
        let script = stealth_script(None);
        assert!(script.contains("'webdriver'"));
        assert!(!script.contains("userAgent"));
    }

    #[test]
    fn test_stealth_script_escapes_user_agent() {
        let script = stealth_script(Some("Mozilla/5.0 \"Test\""));
        assert!(script.contains("userAgent"));
        assert!(script.contains("\\\"Test\\\""));
    }
}
