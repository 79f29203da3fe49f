//! Virtual desktop layout: geometric placement of every target's screens.
//!
//! The layout engine maintains one zone per connected target in a shared 2-D
//! plane.  The local machine's monitors are anchored at the origin; each new
//! remote is placed immediately to the right of the current rightmost edge.
//! The engine only *references* targets by [`Ticket`] – it owns no sessions
//! and must be kept in sync with registry add/remove events.

use std::collections::HashMap;

use thiserror::Error;

use crate::domain::geometry::{Delta, LayoutPoint, LocalPoint, Rect};
use crate::domain::ticket::Ticket;

/// Errors raised by layout bookkeeping.
#[derive(Debug, Error, PartialEq)]
pub enum LayoutError {
    /// A zone for this ticket is already present.
    #[error("a zone for ticket {0} is already placed")]
    DuplicateTicket(Ticket),

    /// The ticket has no zone in the layout.
    #[error("ticket {0} has no zone in the layout")]
    UnknownTicket(Ticket),
}

/// How a candidate cursor position relates to the active target's zone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CrossingKind {
    LocalToRemote,
    RemoteToLocal,
    RemoteToRemote,
}

/// Classification of one mouse delta against the layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MoveClassification {
    /// The candidate point stays inside the active zone; forward the raw
    /// delta, no switch.
    InsideActiveArea,
    /// The candidate point falls in no zone (dead space between screens);
    /// forward the raw delta, which clamps at the last in-zone edge.
    UnallocatedArea,
    /// The candidate point falls in another target's zone.
    Crossing {
        kind: CrossingKind,
        target: Ticket,
        /// Boundary point where the cursor leaves the active zone.
        exit: LayoutPoint,
        /// Boundary point where the cursor enters the target zone.
        entry: LayoutPoint,
    },
}

/// One target's screens placed in layout space.
///
/// The local machine may span several monitors; remotes report a single
/// primary screen.
#[derive(Debug, Clone)]
struct Zone {
    rects: Vec<Rect>,
}

impl Zone {
    fn contains(&self, pt: LayoutPoint) -> bool {
        self.rects.iter().any(|r| r.contains(pt))
    }

    /// Rightmost edge across all rects (one past the last column).
    fn right(&self) -> i32 {
        self.rects.iter().map(Rect::right).max().unwrap_or(0)
    }

    /// Top of the rect that owns the rightmost edge; new remotes are placed
    /// level with it.
    fn top_of_rightmost(&self) -> i32 {
        self.rects
            .iter()
            .max_by_key(|r| r.right())
            .map(|r| r.origin.y)
            .unwrap_or(0)
    }

    /// Top-left corner used when translating to and from local coordinates.
    fn origin(&self) -> LayoutPoint {
        self.rects.first().map(|r| r.origin).unwrap_or(LayoutPoint::new(0, 0))
    }

    fn boundary_intersection(&self, from: LayoutPoint, to: LayoutPoint) -> Option<LayoutPoint> {
        self.rects
            .iter()
            .find_map(|r| r.boundary_intersection(from, to))
    }
}

/// The shared-plane arrangement of all controllable targets.
pub struct DesktopLayout {
    local: Ticket,
    zones: HashMap<Ticket, Zone>,
}

impl DesktopLayout {
    /// Creates a layout holding the local machine's monitors.
    ///
    /// `local_screens` come from the monitor-geometry collaborator; the
    /// primary monitor's top-left corner is expected at `(0, 0)`.
    pub fn new(local: Ticket, local_screens: Vec<Rect>) -> Self {
        let mut zones = HashMap::new();
        zones.insert(
            local,
            Zone {
                rects: local_screens,
            },
        );
        Self { local, zones }
    }

    pub fn is_local(&self, ticket: Ticket) -> bool {
        ticket == self.local
    }

    /// Places a newly registered remote to the right of the current overall
    /// rightmost edge, level with that edge's top.
    ///
    /// # Errors
    ///
    /// Returns [`LayoutError::DuplicateTicket`] when the ticket already has a
    /// zone.
    pub fn place_remote(
        &mut self,
        ticket: Ticket,
        width: u32,
        height: u32,
    ) -> Result<LayoutPoint, LayoutError> {
        if self.zones.contains_key(&ticket) {
            return Err(LayoutError::DuplicateTicket(ticket));
        }
        let origin = self.next_free_origin();
        self.zones.insert(
            ticket,
            Zone {
                rects: vec![Rect::new(origin, width, height)],
            },
        );
        Ok(origin)
    }

    /// Removes a remote's zone.  The local zone is never removed.
    ///
    /// # Errors
    ///
    /// Returns [`LayoutError::UnknownTicket`] when no zone exists.
    pub fn remove(&mut self, ticket: Ticket) -> Result<(), LayoutError> {
        if ticket == self.local {
            return Ok(());
        }
        self.zones
            .remove(&ticket)
            .map(|_| ())
            .ok_or(LayoutError::UnknownTicket(ticket))
    }

    /// Returns whether `point` lies inside `ticket`'s zone.
    pub fn contains(&self, ticket: Ticket, point: LayoutPoint) -> bool {
        self.zones.get(&ticket).is_some_and(|z| z.contains(point))
    }

    /// Finds the target whose zone contains `point`.
    pub fn find_owner(&self, point: LayoutPoint) -> Option<Ticket> {
        self.zones
            .iter()
            .find(|(_, zone)| zone.contains(point))
            .map(|(ticket, _)| *ticket)
    }

    /// Translates a layout-space point into `ticket`'s local coordinates.
    pub fn to_local(&self, ticket: Ticket, point: LayoutPoint) -> Option<LocalPoint> {
        let origin = self.zones.get(&ticket)?.origin();
        Some(LocalPoint::new(point.x - origin.x, point.y - origin.y))
    }

    /// Translates `ticket`-local coordinates into layout space.
    pub fn to_layout(&self, ticket: Ticket, point: LocalPoint) -> Option<LayoutPoint> {
        let origin = self.zones.get(&ticket)?.origin();
        Some(LayoutPoint::new(origin.x + point.x, origin.y + point.y))
    }

    /// Classifies one mouse delta for the active target.
    ///
    /// `previous` is the cursor's current layout-space position; the candidate
    /// position is `previous + delta`.
    pub fn classify_move(
        &self,
        active: Ticket,
        previous: LayoutPoint,
        delta: Delta,
    ) -> MoveClassification {
        let candidate = previous.offset(delta);

        if self.contains(active, candidate) {
            return MoveClassification::InsideActiveArea;
        }

        if let Some(target) = self.find_owner(candidate) {
            let kind = match (self.is_local(active), self.is_local(target)) {
                (true, false) => CrossingKind::LocalToRemote,
                (false, true) => CrossingKind::RemoteToLocal,
                (false, false) => CrossingKind::RemoteToRemote,
                // Both local would mean the candidate re-entered the active
                // zone, which the containment check above already handled.
                (true, true) => return MoveClassification::InsideActiveArea,
            };
            let exit = self
                .zones
                .get(&active)
                .and_then(|z| z.boundary_intersection(previous, candidate))
                .unwrap_or(candidate);
            let entry = self
                .zones
                .get(&target)
                .and_then(|z| z.boundary_intersection(previous, candidate))
                .unwrap_or(candidate);
            return MoveClassification::Crossing {
                kind,
                target,
                exit,
                entry,
            };
        }

        MoveClassification::UnallocatedArea
    }

    /// Origin for the next remote zone: one plane, screens packed left to
    /// right, each new arrival level with the current rightmost top.
    fn next_free_origin(&self) -> LayoutPoint {
        let rightmost = self
            .zones
            .values()
            .max_by_key(|z| z.right())
            .expect("layout always holds the local zone");
        LayoutPoint::new(rightmost.right(), rightmost.top_of_rightmost())
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
