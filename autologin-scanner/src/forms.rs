use std::collections::HashMap;
use tracing::debug;
use url::Url;

/// Field-type labels a classifier may assign that identify the username input.
pub const USERNAME_FIELD_TYPES: &[&str] = &["username", "email", "username or email"];
pub const PASSWORD_FIELD_TYPES: &[&str] = &["password"];
pub const CHECKBOX_FIELD_TYPES: &[&str] = &["remember me checkbox"];
pub const SUBMIT_FIELD_TYPES: &[&str] = &["submit button"];

pub const FORM_TYPE_LOGIN: &str = "login";
pub const FORM_TYPE_REGISTRATION: &str = "registration";

/// What kind of HTML control backs a field. Determines which values the
/// control will accept when assigned.
#[derive(Debug, Clone, PartialEq)]
pub enum ControlKind {
    Text,
    Password,
    Checkbox,
    Hidden,
    Submit,
    /// A select only accepts one of its option values.
    Select(Vec<String>),
}

#[derive(Debug, Clone)]
pub struct FieldControl {
    kind: ControlKind,
    value: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldValueError {
    pub field: String,
    pub rejected: String,
}

impl FieldControl {
    pub fn new(kind: ControlKind, value: Option<String>) -> Self {
        Self { kind, value }
    }

    pub fn kind(&self) -> &ControlKind {
        &self.kind
    }

    pub fn value(&self) -> Option<&str> {
        self.value.as_deref()
    }

    /// Assign a value. A select rejects anything that is not one of its
    /// options, the same way a real form field rejects impossible values.
    pub fn set(&mut self, name: &str, value: &str) -> Result<(), FieldValueError> {
        if let ControlKind::Select(options) = &self.kind
            && !options.iter().any(|o| o == value)
        {
            return Err(FieldValueError {
                field: name.to_string(),
                rejected: value.to_string(),
            });
        }
        self.value = Some(value.to_string());
        Ok(())
    }
}

/// A form whose fields have been labelled by purpose. Immutable once built;
/// submission building works on a private copy of the control values.
#[derive(Debug, Clone)]
pub struct ClassifiedForm {
    pub form_type: String,
    /// Form action attribute, possibly relative to the page URL.
    pub action: String,
    pub method: String,
    /// (field name, classified field type) in declaration order.
    pub fields: Vec<(String, String)>,
    controls: HashMap<String, FieldControl>,
}

impl ClassifiedForm {
    pub fn new(form_type: &str, action: &str, method: &str) -> Self {
        Self {
            form_type: form_type.to_string(),
            action: action.to_string(),
            method: method.to_uppercase(),
            fields: Vec::new(),
            controls: HashMap::new(),
        }
    }

    pub fn push_field(&mut self, name: &str, field_type: &str, control: FieldControl) {
        self.fields.push((name.to_string(), field_type.to_string()));
        self.controls.insert(name.to_string(), control);
    }

    pub fn control(&self, name: &str) -> Option<&FieldControl> {
        self.controls.get(name)
    }

    fn first_field_of(&self, types: &[&str]) -> Option<&str> {
        self.fields
            .iter()
            .find(|(_, t)| types.contains(&t.as_str()))
            .map(|(name, _)| name.as_str())
    }
}

/// Everything needed to submit a form: derived deterministically from a
/// classified form plus credentials, with no hidden state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmissionRequest {
    pub url: Url,
    pub method: String,
    pub headers: Vec<(String, String)>,
    pub body: String,
}

/// Build the submission for a login form, or `None` when the form lacks a
/// username or password field and therefore is not a usable login form.
pub fn build_login_submission(
    form: &ClassifiedForm,
    base_url: Option<&Url>,
    username: &str,
    password: &str,
) -> Option<SubmissionRequest> {
    let username_field = form.first_field_of(USERNAME_FIELD_TYPES)?.to_string();
    let password_field = form.first_field_of(PASSWORD_FIELD_TYPES)?.to_string();

    let mut controls = form.controls.clone();

    for (name, field_type) in &form.fields {
        if CHECKBOX_FIELD_TYPES.contains(&field_type.as_str())
            && let Some(control) = controls.get_mut(name)
        {
            // Best effort: the classifier may have mislabelled a control that
            // is not actually a checkbox. Only this assignment may fail
            // silently; every other one is load-bearing.
            if let Err(e) = control.set(name, "on") {
                debug!("field {} rejected checkbox value: {:?}", name, e);
            }
        }
    }

    controls
        .get_mut(&username_field)?
        .set(&username_field, username)
        .ok()?;
    controls
        .get_mut(&password_field)?
        .set(&password_field, password)
        .ok()?;

    // Successful controls in declaration order. Submit buttons are excluded
    // here and appended afterwards so that forms with several submit buttons
    // still carry each button's own value.
    let mut pairs: Vec<(String, String)> = Vec::new();
    for (name, field_type) in &form.fields {
        if SUBMIT_FIELD_TYPES.contains(&field_type.as_str()) {
            continue;
        }
        let Some(control) = controls.get(name) else {
            continue;
        };
        if *control.kind() == ControlKind::Checkbox && control.value() != Some("on") {
            continue;
        }
        if let Some(value) = control.value() {
            pairs.push((name.clone(), value.to_string()));
        }
    }
    for (name, field_type) in &form.fields {
        if SUBMIT_FIELD_TYPES.contains(&field_type.as_str()) {
            let value = controls
                .get(name)
                .and_then(|c| c.value())
                .unwrap_or_default();
            pairs.push((name.clone(), value.to_string()));
        }
    }

    let url = match base_url {
        Some(base) => base.join(&form.action).ok()?,
        None => Url::parse(&form.action).ok()?,
    };

    let headers = if form.method == "POST" {
        vec![(
            "Content-Type".to_string(),
            "application/x-www-form-urlencoded".to_string(),
        )]
    } else {
        Vec::new()
    };

    let body = url::form_urlencoded::Serializer::new(String::new())
        .extend_pairs(pairs.iter().map(|(k, v)| (k.as_str(), v.as_str())))
        .finish();

    Some(SubmissionRequest {
        url,
        method: form.method.clone(),
        headers,
        body,
    })
}

/// Which target form types a page carries.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PageClassification {
    pub has_login: bool,
    pub has_registration: bool,
}

pub fn classify_page(forms: &[ClassifiedForm]) -> PageClassification {
    PageClassification {
        has_login: forms.iter().any(|f| f.form_type == FORM_TYPE_LOGIN),
        has_registration: forms.iter().any(|f| f.form_type == FORM_TYPE_REGISTRATION),
    }
}

/// First form on the page classified as a login form.
pub fn find_login_form(forms: &[ClassifiedForm]) -> Option<&ClassifiedForm> {
    forms.iter().find(|f| f.form_type == FORM_TYPE_LOGIN)
}
