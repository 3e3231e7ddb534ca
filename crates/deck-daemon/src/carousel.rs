use deck_proto::config::CarouselConfig;
use std::str::FromStr;
use std::time::{Duration, Instant};

/// Number of carousel slots on the surface.
pub const WINDOW_SIZE: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Previous,
    Next,
}

impl Direction {
    fn step(self) -> isize {
        match self {
            Direction::Previous => -1,
            Direction::Next => 1,
        }
    }
}

impl FromStr for Direction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "previous" | "prev" | "left" | "-1" => Ok(Direction::Previous),
            "next" | "right" | "+1" | "1" => Ok(Direction::Next),
            other => Err(format!("unknown direction: {}", other)),
        }
    }
}

/// Idle tracking that returns the carousel to its default offset.
#[derive(Debug, Clone)]
pub struct AutoReset {
    /// `None` disables the reset.
    pub idle_threshold: Option<Duration>,
    pub default_offset: usize,
    pub last_interaction: Instant,
}

impl AutoReset {
    pub fn new(idle_threshold: Option<Duration>, default_offset: usize) -> Self {
        Self {
            idle_threshold,
            default_offset,
            last_interaction: Instant::now(),
        }
    }

    pub fn is_idle(&self, now: Instant) -> bool {
        match self.idle_threshold {
            Some(threshold) => now.saturating_duration_since(self.last_interaction) >= threshold,
            None => false,
        }
    }
}

/// Positional window over the ordered catalog ids.
#[derive(Debug, Clone)]
pub struct CarouselNavigator {
    ordered_ids: Vec<String>,
    offset: usize,
    wrap: bool,
    auto_reset: AutoReset,
}

impl CarouselNavigator {
    pub fn new(ordered_ids: Vec<String>, wrap: bool, auto_reset: AutoReset) -> Self {
        let mut nav = Self {
            ordered_ids,
            offset: 0,
            wrap,
            auto_reset,
        };
        nav.offset = nav.default_offset();
        nav
    }

    pub fn from_config(ordered_ids: Vec<String>, config: &CarouselConfig) -> Self {
        Self::new(
            ordered_ids,
            config.infinite_wrap,
            AutoReset::new(config.idle_threshold(), config.default_position),
        )
    }

    pub fn len(&self) -> usize {
        self.ordered_ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ordered_ids.is_empty()
    }

    pub fn offset(&self) -> usize {
        self.offset
    }

    pub fn wraps(&self) -> bool {
        self.wrap
    }

    fn max_offset(&self) -> usize {
        if self.wrap {
            self.len().saturating_sub(1)
        } else {
            self.len().saturating_sub(WINDOW_SIZE)
        }
    }

    /// The configured default, clamped to the valid offsets of the current list.
    pub fn default_offset(&self) -> usize {
        self.auto_reset.default_offset.min(self.max_offset())
    }

    /// Replace the id list, keeping the offset where it is still valid.
    pub fn set_ids(&mut self, ordered_ids: Vec<String>) {
        self.ordered_ids = ordered_ids;
        self.offset = self.offset.min(self.max_offset());
    }

    pub fn navigate(&mut self, direction: Direction) -> bool {
        self.navigate_at(direction, Instant::now())
    }

    /// Move by one slot.  `false` for an empty catalog or when a bounded
    /// carousel is already at its edge.
    pub fn navigate_at(&mut self, direction: Direction, now: Instant) -> bool {
        let n = self.len();
        if n == 0 {
            return false;
        }
        let next = if self.wrap {
            (self.offset as isize + direction.step()).rem_euclid(n as isize) as usize
        } else {
            (self.offset as isize + direction.step()).clamp(0, self.max_offset() as isize) as usize
        };
        let moved = next != self.offset || self.wrap;
        self.offset = next;
        if moved {
            self.auto_reset.last_interaction = now;
        }
        moved
    }

    /// Ids under the carousel keys at `offset`; `None` marks an empty slot.
    pub fn window_at(&self, offset: usize, size: usize) -> Vec<Option<&str>> {
        let n = self.len();
        (0..size)
            .map(|i| {
                if n == 0 {
                    None
                } else if self.wrap {
                    Some(self.ordered_ids[(offset + i) % n].as_str())
                } else {
                    self.ordered_ids.get(offset + i).map(String::as_str)
                }
            })
            .collect()
    }

    pub fn window(&self) -> Vec<Option<&str>> {
        self.window_at(self.offset, WINDOW_SIZE)
    }

    /// Media id under carousel key `button_index`.
    pub fn button_to_media_id(&self, button_index: usize) -> Option<&str> {
        if button_index >= WINDOW_SIZE {
            return None;
        }
        self.window().get(button_index).copied().flatten()
    }

    pub fn can_navigate_previous(&self) -> bool {
        if self.wrap {
            !self.is_empty()
        } else {
            self.offset > 0
        }
    }

    pub fn can_navigate_next(&self) -> bool {
        if self.wrap {
            !self.is_empty()
        } else {
            self.offset < self.max_offset()
        }
    }

    /// Record a key press that did not move the carousel.
    pub fn touch(&mut self) {
        self.auto_reset.last_interaction = Instant::now();
    }

    pub fn reset_to_default(&mut self) {
        self.offset = self.default_offset();
    }

    pub fn check_auto_reset(&mut self) -> bool {
        self.check_auto_reset_at(Instant::now())
    }

    /// Return to the default offset after the idle threshold.  Never fires
    /// while already at the default.
    pub fn check_auto_reset_at(&mut self, now: Instant) -> bool {
        let default = self.default_offset();
        if self.offset == default || !self.auto_reset.is_idle(now) {
            return false;
        }
        self.reset_to_default();
        self.auto_reset.last_interaction = now;
        true
    }
}
