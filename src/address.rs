use crate::channel::Channel;
use crate::error::Error;

const MIN_PHONE_DIGITS: usize = 7;
const MAX_PHONE_DIGITS: usize = 15;

/// Lowercases and trims an email address, rejecting anything that is not
/// shaped like `local@domain`.
pub fn normalize_email(email: &str) -> Result<String, Error> {
    let normalized = email.trim().to_lowercase();

    let valid = match normalized.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && !domain.is_empty()
                && !domain.contains('@')
                && !normalized.contains(char::is_whitespace)
        }
        None => false,
    };

    if !valid {
        return Err(Error::InvalidEmail {
            email: email.to_string(),
        });
    }

    Ok(normalized)
}

/// Strips formatting from a phone number and returns it as `+` followed by
/// 7 to 15 digits.
pub fn normalize_phone(phone: &str) -> Result<String, Error> {
    let trimmed = phone.trim();
    let body = trimmed.strip_prefix('+').unwrap_or(trimmed);

    let mut digits = String::with_capacity(body.len());
    for c in body.chars() {
        match c {
            '0'..='9' => digits.push(c),
            ' ' | '-' | '.' | '(' | ')' => {}
            _ => {
                return Err(Error::InvalidPhone {
                    phone: phone.to_string(),
                })
            }
        }
    }

    if digits.len() < MIN_PHONE_DIGITS || digits.len() > MAX_PHONE_DIGITS {
        return Err(Error::InvalidPhone {
            phone: phone.to_string(),
        });
    }

    Ok(format!("+{}", digits))
}

/// Normalizes an address the way it is stored for the given channel.
pub fn normalize_for_channel(channel: Channel, address: &str) -> Result<String, Error> {
    if channel.uses_phone() {
        normalize_phone(address)
    } else {
        normalize_email(address)
    }
}
