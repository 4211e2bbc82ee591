use crate::forms::{ClassifiedForm, ControlKind, FieldControl, FORM_TYPE_LOGIN, FORM_TYPE_REGISTRATION};
use scraper::{ElementRef, Html, Selector};
use tracing::debug;
use url::Url;

/// Labels the forms on a page by purpose. The crawl and login controllers
/// only ever see classified forms, never raw HTML structure.
pub trait FormClassifier: Send + Sync {
    fn classify(&self, html: &str, page_url: &Url) -> Vec<ClassifiedForm>;
}

/// Marker-word driven classifier. A stand-in for a trained form-type model:
/// password inputs anchor the decision, surrounding text and field mix
/// separate login from registration.
#[derive(Debug, Clone, Copy, Default)]
pub struct HeuristicClassifier;

const REGISTRATION_MARKERS: &[&str] = &[
    "register",
    "registration",
    "signup",
    "sign up",
    "sign-up",
    "create account",
    "create an account",
    "join",
];

impl FormClassifier for HeuristicClassifier {
    fn classify(&self, html: &str, page_url: &Url) -> Vec<ClassifiedForm> {
        let document = Html::parse_document(html);
        let form_selector = Selector::parse("form").unwrap();

        let mut forms = Vec::new();
        for element in document.select(&form_selector) {
            forms.push(classify_form(element, page_url));
        }
        debug!(
            "classified {} form(s) on {}: {:?}",
            forms.len(),
            page_url,
            forms.iter().map(|f| f.form_type.as_str()).collect::<Vec<_>>()
        );
        forms
    }
}

fn classify_form(element: ElementRef<'_>, page_url: &Url) -> ClassifiedForm {
    let action = element.value().attr("action").unwrap_or("").to_string();
    let method = element.value().attr("method").unwrap_or("GET");

    let control_selector = Selector::parse("input, select, textarea, button").unwrap();
    let mut fields: Vec<(String, String, FieldControl)> = Vec::new();
    for control in element.select(&control_selector) {
        if let Some(field) = classify_control(control) {
            fields.push(field);
        }
    }

    let password_count = fields.iter().filter(|(_, t, _)| t == "password").count();
    let has_username = fields
        .iter()
        .any(|(_, t, _)| t == "username" || t == "username or email");
    let has_email = fields.iter().any(|(_, t, _)| t == "email");

    let context = form_context(element, &action);
    let form_type = if password_count == 0 {
        "other"
    } else if password_count >= 2 {
        // Password plus confirmation only appears on registration forms.
        FORM_TYPE_REGISTRATION
    } else if REGISTRATION_MARKERS.iter().any(|m| context.contains(m))
        || (has_username && has_email)
    {
        FORM_TYPE_REGISTRATION
    } else {
        FORM_TYPE_LOGIN
    };

    let mut form = ClassifiedForm::new(form_type, &action, method);
    for (name, field_type, control) in fields {
        form.push_field(&name, &field_type, control);
    }
    let _ = page_url; // context for future per-site rules
    form
}

/// Lowercased text around the form plus its own attributes; used only for
/// the login/registration distinction.
fn form_context(element: ElementRef<'_>, action: &str) -> String {
    let mut context = element.text().collect::<Vec<_>>().join(" ");
    context.push(' ');
    context.push_str(action);
    for attr in ["id", "class", "name"] {
        if let Some(value) = element.value().attr(attr) {
            context.push(' ');
            context.push_str(value);
        }
    }
    context.to_lowercase()
}

fn classify_control(control: ElementRef<'_>) -> Option<(String, String, FieldControl)> {
    let tag = control.value().name();
    let name = control.value().attr("name")?.to_string();
    let value = control.value().attr("value").map(str::to_string);

    let (field_type, field_control) = match tag {
        "select" => {
            let option_selector = Selector::parse("option").unwrap();
            let options: Vec<String> = control
                .select(&option_selector)
                .filter_map(|o| o.value().attr("value").map(str::to_string))
                .collect();
            let selected = options.first().cloned();
            ("select".to_string(), FieldControl::new(ControlKind::Select(options), selected))
        }
        "textarea" => ("text".to_string(), FieldControl::new(ControlKind::Text, None)),
        "button" => {
            let button_type = control.value().attr("type").unwrap_or("submit");
            if button_type != "submit" {
                return None;
            }
            (
                "submit button".to_string(),
                FieldControl::new(ControlKind::Submit, value),
            )
        }
        _ => {
            let input_type = control.value().attr("type").unwrap_or("text").to_lowercase();
            let hints = input_hints(control, &name);
            match input_type.as_str() {
                "password" => (
                    "password".to_string(),
                    FieldControl::new(ControlKind::Password, value),
                ),
                "email" => ("email".to_string(), FieldControl::new(ControlKind::Text, value)),
                "checkbox" => {
                    let checked = control.value().attr("checked").is_some();
                    let field_type = if hints.contains("remember") {
                        "remember me checkbox"
                    } else {
                        "checkbox"
                    };
                    (
                        field_type.to_string(),
                        FieldControl::new(
                            ControlKind::Checkbox,
                            checked.then(|| "on".to_string()),
                        ),
                    )
                }
                "submit" | "image" => (
                    "submit button".to_string(),
                    FieldControl::new(ControlKind::Submit, value),
                ),
                "hidden" => (
                    "hidden".to_string(),
                    FieldControl::new(ControlKind::Hidden, value),
                ),
                "text" | "" => {
                    // Ambiguity wins: "login" and mixed user/email hints
                    // outrank a plain email match.
                    let field_type = if hints.contains("login")
                        || (hints.contains("user") && hints.contains("email"))
                    {
                        "username or email"
                    } else if hints.contains("email") {
                        "email"
                    } else if hints.contains("user") {
                        "username"
                    } else {
                        "text"
                    };
                    (field_type.to_string(), FieldControl::new(ControlKind::Text, value))
                }
                // Buttons without submit semantics, radio groups etc. are of
                // no use to a login submission.
                _ => return None,
            }
        }
    };

    Some((name, field_type, field_control))
}

fn input_hints(control: ElementRef<'_>, name: &str) -> String {
    let mut hints = name.to_string();
    for attr in ["id", "placeholder", "autocomplete"] {
        if let Some(value) = control.value().attr(attr) {
            hints.push(' ');
            hints.push_str(value);
        }
    }
    hints.to_lowercase()
}

/// An outbound link with the anchor text that pointed at it.
#[derive(Debug, Clone)]
pub struct Link {
    pub url: Url,
    pub text: String,
}

/// Extract same-document outbound links, resolved against the page URL with
/// fragments stripped. Non-navigational schemes are skipped.
pub fn extract_links(html: &str, page_url: &Url) -> Vec<Link> {
    let document = Html::parse_document(html);
    let link_selector = Selector::parse("a[href]").unwrap();

    let mut links = Vec::new();
    for element in document.select(&link_selector) {
        let Some(href) = element.value().attr("href") else {
            continue;
        };
        if href.is_empty()
            || href.starts_with("javascript:")
            || href.starts_with("mailto:")
            || href.starts_with("tel:")
            || href.starts_with('#')
        {
            continue;
        }
        let Ok(mut url) = page_url.join(href) else {
            continue;
        };
        url.set_fragment(None);
        let text = element
            .text()
            .collect::<Vec<_>>()
            .join(" ")
            .trim()
            .to_string();
        links.push(Link { url, text });
    }
    links
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::forms::{build_login_submission, classify_page};

    fn page_url() -> Url {
        Url::parse("http://example.com/account").unwrap()
    }

    #[test]
    fn test_classifies_login_form() {
        let html = r#"
            <form action="/login" method="post">
                <input type="text" name="user">
                <input type="password" name="pass">
                <input type="submit" name="go" value="Log in">
            </form>
        "#;
        let forms = HeuristicClassifier.classify(html, &page_url());
        assert_eq!(forms.len(), 1);
        assert_eq!(forms[0].form_type, "login");
        assert_eq!(
            forms[0].fields,
            vec![
                ("user".to_string(), "username".to_string()),
                ("pass".to_string(), "password".to_string()),
                ("go".to_string(), "submit button".to_string()),
            ]
        );
    }

    #[test]
    fn test_classifies_registration_by_double_password() {
        let html = r#"
            <form action="/new" method="post">
                <input type="text" name="user">
                <input type="password" name="pass">
                <input type="password" name="pass_confirm">
            </form>
        "#;
        let forms = HeuristicClassifier.classify(html, &page_url());
        assert_eq!(forms[0].form_type, "registration");
    }

    #[test]
    fn test_classifies_registration_by_marker_text() {
        let html = r#"
            <form action="/signup" method="post">
                <h2>Create an account</h2>
                <input type="email" name="email">
                <input type="password" name="pass">
            </form>
        "#;
        let forms = HeuristicClassifier.classify(html, &page_url());
        assert_eq!(forms[0].form_type, "registration");
    }

    #[test]
    fn test_form_without_password_is_other() {
        let html = r#"<form action="/search"><input type="text" name="q"></form>"#;
        let forms = HeuristicClassifier.classify(html, &page_url());
        assert_eq!(forms[0].form_type, "other");
        assert!(!classify_page(&forms).has_login);
    }

    #[test]
    fn test_remember_me_checkbox_detection() {
        let html = r#"
            <form action="/login" method="post">
                <input type="text" name="login" placeholder="Username or email">
                <input type="password" name="pw">
                <input type="checkbox" name="remember_me">
            </form>
        "#;
        let forms = HeuristicClassifier.classify(html, &page_url());
        assert_eq!(forms[0].fields[0].1, "username or email");
        assert_eq!(forms[0].fields[2].1, "remember me checkbox");

        let submission =
            build_login_submission(&forms[0], Some(&page_url()), "alice", "pw").unwrap();
        assert!(submission.body.contains("remember_me=on"));
    }

    #[test]
    fn test_mixed_user_email_hints_stay_ambiguous() {
        let html = r#"
            <form action="/login" method="post">
                <input type="text" name="user_email">
                <input type="text" name="email">
                <input type="password" name="pw">
            </form>
        "#;
        let forms = HeuristicClassifier.classify(html, &page_url());
        assert_eq!(forms[0].fields[0].1, "username or email");
        assert_eq!(forms[0].fields[1].1, "email");
    }

    #[test]
    fn test_unnamed_inputs_are_skipped() {
        let html = r#"
            <form action="/login" method="post">
                <input type="text">
                <input type="password" name="pass">
            </form>
        "#;
        let forms = HeuristicClassifier.classify(html, &page_url());
        assert_eq!(forms[0].fields.len(), 1);
    }

    #[test]
    fn test_extract_links_resolves_and_strips_fragments() {
        let html = r##"
            <a href="/about#team">About Us</a>
            <a href="signup">Sign Up Now</a>
            <a href="javascript:void(0)">App</a>
            <a href="mailto:x@example.com">Mail</a>
            <a href="#top">Top</a>
        "##;
        let links = extract_links(html, &page_url());
        assert_eq!(links.len(), 2);
        assert_eq!(links[0].url.as_str(), "http://example.com/about");
        assert_eq!(links[0].text, "About Us");
        assert_eq!(links[1].url.as_str(), "http://example.com/signup");
        assert_eq!(links[1].text, "Sign Up Now");
    }
}
