// src/analyzer/login.rs
// =============================================================================
// Guesses whether a page contains a login form.
//
// A form counts as a login form when it has a password input AND either:
// - a username-like input: type text/email/tel (or no type) whose name, id
//   or placeholder mentions user, login, email, account or phone
// - a login button: <button> text or <input type=submit|button> value
//   mentioning login, log in, sign in or signin
//
// Pure attribute matching; no scripts are run.
// =============================================================================

use scraper::{ElementRef, Html};

use super::html::selector;
use crate::error::AnalysisError;

const USERNAME_HINTS: &[&str] = &["user", "login", "email", "account", "phone"];
const LOGIN_BUTTON_HINTS: &[&str] = &["login", "log in", "sign in", "signin"];

pub fn has_login_form(document: &Html) -> Result<bool, AnalysisError> {
    let forms = selector("form")?;
    for form in document.select(&forms) {
        if is_login_form(form)? {
            return Ok(true);
        }
    }
    Ok(false)
}

pub fn is_login_form(form: ElementRef<'_>) -> Result<bool, AnalysisError> {
    let mut has_password = false;
    let mut has_username = false;
    let mut has_login_button = false;

    for input in form.select(&selector("input")?) {
        let attr = |name: &str| input.value().attr(name).unwrap_or("").to_lowercase();
        let input_type = attr("type");

        match input_type.as_str() {
            "password" => has_password = true,
            // A missing type attribute means a text input
            "" | "text" | "email" | "tel" => {
                if ["name", "id", "placeholder"]
                    .iter()
                    .any(|name| mentions_any(&attr(name), USERNAME_HINTS))
                {
                    has_username = true;
                }
            }
            "submit" | "button" => {
                if mentions_any(&attr("value"), LOGIN_BUTTON_HINTS) {
                    has_login_button = true;
                }
            }
            _ => {}
        }
    }

    for button in form.select(&selector("button")?) {
        let text = button.text().collect::<String>().to_lowercase();
        if mentions_any(&text, LOGIN_BUTTON_HINTS) {
            has_login_button = true;
        }
    }

    Ok(has_password && (has_username || has_login_button))
}

fn mentions_any(value: &str, hints: &[&str]) -> bool {
    hints.iter().any(|hint| value.contains(hint))
}
