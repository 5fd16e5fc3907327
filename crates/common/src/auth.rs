use chrono::NaiveDate;
use tracing::info;

use crate::{Error, Result};

/// Build stops working after this date. Checked before any trading state
/// is created; failure is fatal at startup.
const EXPIRY: (i32, u32, u32) = (2026, 12, 1);

pub fn check_expiry(today: NaiveDate) -> Result<()> {
    let (y, m, d) = EXPIRY;
    let expiry = NaiveDate::from_ymd_opt(y, m, d)
        .ok_or_else(|| Error::Config("invalid build expiry date".into()))?;
    if today > expiry {
        return Err(Error::Auth(format!(
            "this build expired on {expiry}; update to a current release"
        )));
    }
    Ok(())
}

/// UID whitelist gate. An empty whitelist disables the check.
pub fn check_uid(uid: &str, allowed: &[String]) -> Result<()> {
    if allowed.is_empty() {
        return Ok(());
    }
    if allowed.iter().any(|a| a == uid) {
        info!(uid, "UID accepted");
        Ok(())
    } else {
        Err(Error::Auth(format!("UID '{uid}' is not whitelisted")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expiry_rejects_past_builds() {
        let late = NaiveDate::from_ymd_opt(2100, 1, 1).unwrap();
        assert!(check_expiry(late).is_err());
        let early = NaiveDate::from_ymd_opt(2025, 1, 1).unwrap();
        assert!(check_expiry(early).is_ok());
    }

    #[test]
    fn uid_gate_disabled_when_whitelist_empty() {
        assert!(check_uid("anyone", &[]).is_ok());
    }

    #[test]
    fn uid_gate_enforces_whitelist() {
        let allowed = vec!["12345".to_string()];
        assert!(check_uid("12345", &allowed).is_ok());
        assert!(check_uid("99999", &allowed).is_err());
    }
}
