//! Swing/reset decisions and per-station pendulum state.
//!
//! A [`Station`] owns the arm's state. Every state read and the command it
//! leads to happen under one lock, so two actuations on the same arm can
//! interleave their waits but never their decide-and-send steps.

use std::sync::{Arc, Mutex, MutexGuard};

use pendulum_traits::DeviceLink;

use crate::config::CommandSet;
use crate::error::SorterError;
use crate::hw_error::map_link_error_dyn;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    Left,
    Right,
}

/// Physical swing direction for a chute; `None` means straight through.
///
/// 1 = left, 2 = right, 3 or <= 0 = no action. Larger chutes fall back to
/// parity (even right, odd left) for stations that multiplex extra lanes.
pub fn swing_for_chute(chute: i32) -> Option<Direction> {
    match chute {
        1 => Some(Direction::Left),
        2 => Some(Direction::Right),
        c if c == 3 || c <= 0 => None,
        c if c % 2 == 0 => Some(Direction::Right),
        _ => Some(Direction::Left),
    }
}

/// Whether the arm must reset after serving a package.
///
/// `current` is the arm's position; `next` is the direction the next expected
/// package needs (outer `None` when there is no next package). Only an
/// identical next direction keeps the arm where it is.
pub fn needs_reset(current: Option<Direction>, next: Option<Option<Direction>>) -> bool {
    match (current, next) {
        (None, _) => false,
        (Some(_), None) | (Some(_), Some(None)) => true,
        (Some(cur), Some(Some(n))) => cur != n,
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PendulumState {
    /// Current arm position; `None` when reset.
    pub swung: Option<Direction>,
    /// Package that put the arm in its current swung position.
    pub swung_by: Option<u64>,
    /// Last package this station finished handling.
    pub last_index: Option<u64>,
}

#[derive(Debug)]
pub struct Station {
    name: Arc<str>,
    commands: CommandSet,
    state: Mutex<PendulumState>,
}

impl Station {
    pub fn new(name: impl Into<Arc<str>>, commands: CommandSet) -> Self {
        Self {
            name: name.into(),
            commands,
            state: Mutex::new(PendulumState::default()),
        }
    }

    pub fn name(&self) -> &Arc<str> {
        &self.name
    }

    pub fn commands(&self) -> &CommandSet {
        &self.commands
    }

    fn lock(&self) -> MutexGuard<'_, PendulumState> {
        self.state.lock().unwrap_or_else(|p| p.into_inner())
    }

    pub fn state(&self) -> PendulumState {
        *self.lock()
    }

    fn swing_frame(&self, dir: Direction) -> &[u8] {
        match dir {
            Direction::Left => &self.commands.swing_left,
            Direction::Right => &self.commands.swing_right,
        }
    }

    fn reset_frame(&self, dir: Direction) -> &[u8] {
        match dir {
            Direction::Left => &self.commands.reset_left,
            Direction::Right => &self.commands.reset_right,
        }
    }

    fn send(&self, link: &dyn DeviceLink, frame: &[u8]) -> Result<(), SorterError> {
        link.send(frame).map_err(|e| map_link_error_dyn(e.as_ref()))
    }

    /// Bring the arm into position for package `index` heading `target`.
    ///
    /// A swing in another direction (or any swing, for a straight-through
    /// package) is reset first. Swing commands are always sent, even when the
    /// arm already points the right way.
    pub fn position(
        &self,
        link: &dyn DeviceLink,
        index: u64,
        target: Option<Direction>,
    ) -> Result<(), SorterError> {
        let mut st = self.lock();
        if let Some(cur) = st.swung
            && target != Some(cur)
        {
            tracing::debug!(station = %self.name, index, ?cur, "resetting stale swing");
            self.send(link, self.reset_frame(cur))?;
            st.swung = None;
            st.swung_by = None;
        }
        if let Some(dir) = target {
            self.send(link, self.swing_frame(dir))?;
            st.swung = Some(dir);
            st.swung_by = Some(index);
            tracing::debug!(station = %self.name, index, ?dir, "swing");
        }
        Ok(())
    }

    /// Reset decision after package `index` has passed the arm.
    ///
    /// Does nothing when a later package has already taken over the arm.
    /// Returns true when a reset command was sent.
    pub fn settle(
        &self,
        link: &dyn DeviceLink,
        index: u64,
        next: Option<Option<Direction>>,
    ) -> Result<bool, SorterError> {
        let mut st = self.lock();
        if st.swung_by.is_some() && st.swung_by != Some(index) {
            tracing::debug!(station = %self.name, index, "arm taken over; skipping reset decision");
            return Ok(false);
        }
        let Some(cur) = st.swung else {
            return Ok(false);
        };
        if !needs_reset(Some(cur), next) {
            tracing::debug!(station = %self.name, index, ?cur, "next package shares direction; reset elided");
            return Ok(false);
        }
        self.send(link, self.reset_frame(cur))?;
        st.swung = None;
        st.swung_by = None;
        tracing::debug!(station = %self.name, index, ?cur, "reset");
        Ok(true)
    }

    pub fn finish(&self, index: u64) {
        let mut st = self.lock();
        if st.last_index.is_none_or(|last| index > last) {
            st.last_index = Some(index);
        }
    }

    /// Forget the arm position, e.g. after the startup sequence reset it.
    pub fn clear(&self) {
        *self.lock() = PendulumState::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(1, Some(Direction::Left))]
    #[case(2, Some(Direction::Right))]
    #[case(3, None)]
    #[case(0, None)]
    #[case(-4, None)]
    #[case(4, Some(Direction::Right))]
    #[case(5, Some(Direction::Left))]
    #[case(10, Some(Direction::Right))]
    fn chute_directions(#[case] chute: i32, #[case] want: Option<Direction>) {
        assert_eq!(swing_for_chute(chute), want);
    }

    #[rstest]
    #[case(None, None, false)]
    #[case(None, Some(Some(Direction::Left)), false)]
    #[case(Some(Direction::Left), None, true)]
    #[case(Some(Direction::Left), Some(None), true)]
    #[case(Some(Direction::Left), Some(Some(Direction::Left)), false)]
    #[case(Some(Direction::Left), Some(Some(Direction::Right)), true)]
    #[case(Some(Direction::Right), Some(Some(Direction::Right)), false)]
    fn reset_decisions(
        #[case] current: Option<Direction>,
        #[case] next: Option<Option<Direction>>,
        #[case] want: bool,
    ) {
        assert_eq!(needs_reset(current, next), want);
    }
}
