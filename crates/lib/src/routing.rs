//! Address mapping between phone numbers and JIDs.
//!
//! Local users are listed in config (bare JID <-> phone). Remote parties exist on the
//! XMPP side only as `<phone>@<component>`; the component may speak for them but never
//! for a local user.

use std::collections::{BTreeMap, HashMap};

use crate::gateway::TranslateError;

/// True for E.164 numbers: `+` followed by 1 to 15 ASCII digits.
pub fn is_phone_number(s: &str) -> bool {
    let Some(digits) = s.strip_prefix('+') else {
        return false;
    };
    (1..=15).contains(&digits.len()) && digits.bytes().all(|b| b.is_ascii_digit())
}

/// JID without its resource, lowercased for lookups.
pub fn bare_jid(jid: &str) -> String {
    let bare = jid.split_once('/').map_or(jid, |(bare, _)| bare);
    bare.trim().to_lowercase()
}

fn checked_phone(phone: &str) -> Result<&str, TranslateError> {
    let phone = phone.trim();
    if is_phone_number(phone) {
        Ok(phone)
    } else {
        Err(TranslateError::InvalidPhone(phone.to_string()))
    }
}

/// Phone <-> JID mapping for one component.
#[derive(Debug, Clone)]
pub struct AddressBook {
    component: String,
    /// bare JID -> phone (local users)
    phone_by_jid: HashMap<String, String>,
    /// phone -> bare JID (local users)
    jid_by_phone: HashMap<String, String>,
}

impl AddressBook {
    pub fn new(component: impl Into<String>, users: &BTreeMap<String, String>) -> Self {
        let mut phone_by_jid = HashMap::new();
        let mut jid_by_phone = HashMap::new();
        for (jid, phone) in users {
            let jid = bare_jid(jid);
            let phone = phone.trim().to_string();
            jid_by_phone.insert(phone.clone(), jid.clone());
            phone_by_jid.insert(jid, phone);
        }
        Self {
            component: component.into().trim().to_lowercase(),
            phone_by_jid,
            jid_by_phone,
        }
    }

    /// JID of the local user who owns `phone`. SMS for any other number has nobody to go to.
    pub fn user_jid(&self, phone: &str) -> Result<String, TranslateError> {
        let phone = checked_phone(phone)?;
        self.jid_by_phone
            .get(phone)
            .cloned()
            .ok_or_else(|| TranslateError::NoUser(phone.to_string()))
    }

    /// `<phone>@<component>`: how a remote party appears to local users.
    pub fn remote_jid(&self, phone: &str) -> Result<String, TranslateError> {
        let phone = checked_phone(phone)?;
        Ok(format!("{}@{}", phone, self.component))
    }

    /// Phone of the local user `jid`, if it is one. Component JIDs never are.
    pub fn user_phone(&self, jid: &str) -> Option<&str> {
        self.phone_by_jid.get(&bare_jid(jid)).map(String::as_str)
    }

    /// Phone number addressed by a component JID.
    pub fn remote_phone(&self, jid: &str) -> Result<String, TranslateError> {
        let bare = bare_jid(jid);
        match bare.split_once('@') {
            Some((local, domain)) if domain == self.component && is_phone_number(local) => {
                Ok(local.to_string())
            }
            _ => Err(TranslateError::NoPhone(jid.to_string())),
        }
    }
}
