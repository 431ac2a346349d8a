//! Site-specific selectors and page-classification markers.
//!
//! The default marker set targets a login flow built on Ant Design form
//! controls with Traditional Chinese labels. Every selector and keyword list
//! can be overridden for other sites via the struct fields.

/// The role a page element plays in the login flow.
///
/// Used in timeout errors so logs say which element never appeared.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldRole {
    /// The site username input.
    Username,
    /// The site password input.
    Password,
    /// The credentials submit button.
    SubmitButton,
    /// The mail-address input on the verification page.
    MailAddress,
    /// The verification-code input.
    VerificationCode,
    /// The button that asks the site to send the code email.
    SendCodeButton,
}

impl std::fmt::Display for FieldRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FieldRole::Username => write!(f, "username field"),
            FieldRole::Password => write!(f, "password field"),
            FieldRole::SubmitButton => write!(f, "submit button"),
            FieldRole::MailAddress => write!(f, "mail address field"),
            FieldRole::VerificationCode => write!(f, "verification code field"),
            FieldRole::SendCodeButton => write!(f, "send-code button"),
        }
    }
}

/// Selectors and text markers describing the target site's login pages.
///
/// Classification checks run in a fixed order: error banners first, then
/// rate-limit markers, then the verification page, then success markers, and
/// finally the login form itself (a form that is still present after a
/// submission means the credentials were rejected).
#[derive(Debug, Clone)]
pub struct SiteMarkers {
    /// CSS selector for the username input.
    pub username_field: String,
    /// CSS selector for the password input.
    pub password_field: String,
    /// CSS selector for the credentials submit button.
    pub submit_button: String,
    /// CSS selector for the mail-address input on the verification page.
    pub mail_address_field: String,
    /// CSS selector for the verification-code input.
    pub code_field: String,
    /// Button text fragments identifying the send-code button.
    pub send_code_texts: Vec<String>,
    /// CSS selector for error/alert banners.
    pub error_banner: String,
    /// Lowercase text fragments that mark a rate-limit response.
    pub rate_limit_texts: Vec<String>,
    /// Lowercase text fragments that mark a credential rejection banner.
    pub rejection_texts: Vec<String>,
    /// CSS selectors whose presence marks a logged-in page.
    pub success_selectors: Vec<String>,
    /// Lowercase URL fragments that mark a logged-in page.
    pub success_url_keywords: Vec<String>,
    /// Lowercase URL fragments that mark the verification page.
    pub verification_url_keywords: Vec<String>,
    /// Placeholder fragments that mark verification inputs.
    pub verification_placeholder_texts: Vec<String>,
}

impl Default for SiteMarkers {
    fn default() -> Self {
        Self {
            username_field: "#username".into(),
            password_field: "#password".into(),
            submit_button: "button[type=submit]".into(),
            mail_address_field: "#email".into(),
            code_field: "input[placeholder*='驗證碼'], input[placeholder*='验证码']".into(),
            send_code_texts: vec!["獲取驗證碼".into(), "获取验证码".into()],
            error_banner: "div[class*='error'], div[class*='alert'], div[class*='danger']".into(),
            rate_limit_texts: vec![
                "too many".into(),
                "rate limit".into(),
                "請求過於頻繁".into(),
                "请求过于频繁".into(),
                "429".into(),
            ],
            rejection_texts: vec![
                "错误".into(),
                "失败".into(),
                "incorrect".into(),
                "invalid".into(),
                "failed".into(),
            ],
            success_selectors: vec![
                "a[href*='logout']".into(),
                "div[class*='user']".into(),
            ],
            success_url_keywords: vec![
                "index".into(),
                "home".into(),
                "dashboard".into(),
                "member".into(),
                "browse".into(),
                "torrents".into(),
            ],
            verification_url_keywords: vec![
                "verify".into(),
                "2fa".into(),
                "verification".into(),
            ],
            verification_placeholder_texts: vec![
                "驗證碼".into(),
                "验证码".into(),
                "verification".into(),
                "code".into(),
            ],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_markers_cover_all_roles() {
        let markers = SiteMarkers::default();
        assert!(!markers.username_field.is_empty());
        assert!(!markers.password_field.is_empty());
        assert!(!markers.submit_button.is_empty());
        assert!(!markers.send_code_texts.is_empty());
        assert!(!markers.rate_limit_texts.is_empty());
        assert!(!markers.success_selectors.is_empty());
    }

    #[test]
    fn test_field_role_display() {
        assert_eq!(FieldRole::Username.to_string(), "username field");
        assert_eq!(FieldRole::SendCodeButton.to_string(), "send-code button");
    }
}
