//! Validation and repair of peer-declared client data.
//!
//! A client's self-description arrives over the network and is treated as
//! hostile until proven otherwise: the GUID may be garbage or collide with a
//! connected client, and the declared cursor may lie outside the declared
//! resolution.  Repairable problems never reject the handshake – they are
//! corrected and recorded as [`FixableIssues`] flags for diagnostics.

use std::fmt;

use uuid::Uuid;

use crate::domain::geometry::LocalPoint;
use crate::protocol::messages::{ClientInfo, OsFamily};

/// Bit-flag set recording which corrections were applied during validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FixableIssues(u8);

impl FixableIssues {
    pub const MOUSE_POSITION_OUT_OF_BOUNDS: FixableIssues = FixableIssues(1);
    pub const GUID_INVALID: FixableIssues = FixableIssues(2);
    pub const GUID_ALREADY_USED: FixableIssues = FixableIssues(4);

    pub fn none() -> Self {
        Self(0)
    }

    pub fn add(&mut self, issue: FixableIssues) {
        self.0 |= issue.0;
    }

    pub fn has(&self, issue: FixableIssues) -> bool {
        self.0 & issue.0 != 0
    }

    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for FixableIssues {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return write!(f, "None");
        }
        let mut names = Vec::new();
        if self.has(Self::MOUSE_POSITION_OUT_OF_BOUNDS) {
            names.push("MousePositionOutOfBounds");
        }
        if self.has(Self::GUID_INVALID) {
            names.push("GuidInvalid");
        }
        if self.has(Self::GUID_ALREADY_USED) {
            names.push("GuidAlreadyUsed");
        }
        write!(f, "{}", names.join(", "))
    }
}

/// Server-corrected client description.
///
/// Produced exclusively by [`repair`]; by construction the GUID is unique
/// among connected clients and the cursor lies inside the declared screen.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientValidInfo {
    pub name: String,
    pub width: i32,
    pub height: i32,
    pub guid: Uuid,
    pub cursor: LocalPoint,
    pub os: OsFamily,
}

/// Validates a declared [`ClientInfo`] and repairs what can be repaired.
///
/// `taken` is the set of GUIDs currently connected; the server's own id is
/// passed separately and is equally off-limits.  The caller must have already
/// verified that the declared resolution is at least 1×1.
pub fn repair(
    declared: &ClientInfo,
    taken: &[Uuid],
    server_id: Uuid,
) -> (ClientValidInfo, FixableIssues) {
    let mut issues = FixableIssues::none();

    let guid = match Uuid::parse_str(&declared.guid) {
        Err(_) => {
            issues.add(FixableIssues::GUID_INVALID);
            generate_unique_guid(taken, server_id)
        }
        Ok(candidate) if candidate == server_id || taken.contains(&candidate) => {
            issues.add(FixableIssues::GUID_ALREADY_USED);
            generate_unique_guid(taken, server_id)
        }
        Ok(candidate) => candidate,
    };

    // A client that could not read its own cursor gets the screen centre.
    let declared_cursor = declared.cursor;
    let x = declared_cursor.map(|c| c.x).unwrap_or(declared.width / 2);
    let y = declared_cursor.map(|c| c.y).unwrap_or(declared.height / 2);
    let clamped_x = x.clamp(0, declared.width - 1);
    let clamped_y = y.clamp(0, declared.height - 1);
    if let Some(cursor) = declared_cursor {
        if cursor.x != clamped_x || cursor.y != clamped_y {
            issues.add(FixableIssues::MOUSE_POSITION_OUT_OF_BOUNDS);
        }
    }

    if !issues.is_empty() {
        tracing::debug!("client data repaired: {issues}");
    }

    let info = ClientValidInfo {
        name: declared.name.clone(),
        width: declared.width,
        height: declared.height,
        guid,
        cursor: LocalPoint::new(clamped_x, clamped_y),
        os: declared.os,
    };
    (info, issues)
}

fn generate_unique_guid(taken: &[Uuid], server_id: Uuid) -> Uuid {
    let mut guid = Uuid::new_v4();
    while guid == server_id || taken.contains(&guid) {
        guid = Uuid::new_v4();
    }
    guid
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::messages::CursorPosition;

    fn declared(guid: &str, cursor: Option<(i32, i32)>) -> ClientInfo {
        ClientInfo {
            width: 1920,
            height: 1080,
            name: "unit".to_string(),
            guid: guid.to_string(),
            cursor: cursor.map(|(x, y)| CursorPosition { x, y }),
            os: OsFamily::Mock,
            password: String::new(),
        }
    }

    #[test]
    fn test_well_formed_unique_guid_passes_untouched() {
        let wanted = Uuid::new_v4();
        let (info, issues) = repair(&declared(&wanted.to_string(), Some((10, 10))), &[], Uuid::new_v4());
        assert_eq!(info.guid, wanted);
        assert!(issues.is_empty());
    }

    #[test]
    fn test_unparseable_guid_is_regenerated_and_flagged() {
        let (info, issues) = repair(&declared("not-a-guid", Some((10, 10))), &[], Uuid::new_v4());
        assert!(issues.has(FixableIssues::GUID_INVALID));
        assert!(!issues.has(FixableIssues::GUID_ALREADY_USED));
        assert_ne!(info.guid.to_string(), "not-a-guid");
    }

    #[test]
    fn test_guid_colliding_with_connected_client_is_replaced() {
        let used = Uuid::new_v4();
        let (info, issues) = repair(&declared(&used.to_string(), None), &[used], Uuid::new_v4());
        assert!(issues.has(FixableIssues::GUID_ALREADY_USED));
        assert_ne!(info.guid, used);
    }

    #[test]
    fn test_guid_equal_to_server_id_is_replaced() {
        let server = Uuid::new_v4();
        let (info, issues) = repair(&declared(&server.to_string(), None), &[], server);
        assert!(issues.has(FixableIssues::GUID_ALREADY_USED));
        assert_ne!(info.guid, server);
    }

    #[test]
    fn test_regenerated_guid_avoids_every_taken_id() {
        let taken: Vec<Uuid> = (0..8).map(|_| Uuid::new_v4()).collect();
        let (info, _) = repair(&declared("garbage", None), &taken, Uuid::new_v4());
        assert!(!taken.contains(&info.guid));
    }

    #[test]
    fn test_cursor_is_clamped_per_axis_and_flagged() {
        let (info, issues) = repair(
            &declared(&Uuid::new_v4().to_string(), Some((2000, -5))),
            &[],
            Uuid::new_v4(),
        );
        assert_eq!(info.cursor, LocalPoint::new(1919, 0));
        assert!(issues.has(FixableIssues::MOUSE_POSITION_OUT_OF_BOUNDS));
    }

    #[test]
    fn test_in_bounds_cursor_is_not_flagged() {
        let (info, issues) = repair(
            &declared(&Uuid::new_v4().to_string(), Some((0, 1079))),
            &[],
            Uuid::new_v4(),
        );
        assert_eq!(info.cursor, LocalPoint::new(0, 1079));
        assert!(!issues.has(FixableIssues::MOUSE_POSITION_OUT_OF_BOUNDS));
    }

    #[test]
    fn test_missing_cursor_defaults_to_screen_centre_without_flag() {
        let (info, issues) = repair(&declared(&Uuid::new_v4().to_string(), None), &[], Uuid::new_v4());
        assert_eq!(info.cursor, LocalPoint::new(960, 540));
        assert!(!issues.has(FixableIssues::MOUSE_POSITION_OUT_OF_BOUNDS));
    }

    #[test]
    fn test_spec_scenario_bad_guid_and_out_of_bounds_cursor() {
        // width 1920, height 1080, cursor (2000, 1090), guid "not-a-guid":
        // both repairs fire, cursor lands on (1919, 1079).
        let (info, issues) = repair(&declared("not-a-guid", Some((2000, 1090))), &[], Uuid::new_v4());
        assert!(issues.has(FixableIssues::GUID_INVALID));
        assert!(issues.has(FixableIssues::MOUSE_POSITION_OUT_OF_BOUNDS));
        assert!(!issues.has(FixableIssues::GUID_ALREADY_USED));
        assert_eq!(info.cursor, LocalPoint::new(1919, 1079));
    }

    #[test]
    fn test_display_renders_flag_names() {
        let mut issues = FixableIssues::none();
        assert_eq!(issues.to_string(), "None");
        issues.add(FixableIssues::GUID_INVALID);
        issues.add(FixableIssues::MOUSE_POSITION_OUT_OF_BOUNDS);
        assert_eq!(issues.to_string(), "MousePositionOutOfBounds, GuidInvalid");
    }
}
