use chess::Board;

use crate::error::Rejection;
use crate::game::rules::RulesEngine;
use crate::models::GameRecord;

/// Where the board is pointed. Browsing positions are counted in plies:
/// ply 0 is the starting position, ply `n` the position after `n` moves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CursorMode {
    #[default]
    Live,
    Browsing {
        ply: usize,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NavCommand {
    Start,
    Prev,
    Next,
    End,
    Jump(usize),
}

/// Replay pointer over the move list, independent of the live record
#[derive(Debug, Clone, Default)]
pub struct NavigationCursor {
    mode: CursorMode,
}

impl NavigationCursor {
    pub fn mode(&self) -> CursorMode {
        self.mode
    }

    pub fn is_live(&self) -> bool {
        self.mode == CursorMode::Live
    }

    /// Plies applied to the displayed position in a game of `total` plies
    pub fn ply(&self, total: usize) -> usize {
        match self.mode {
            CursorMode::Live => total,
            CursorMode::Browsing { ply } => ply.min(total),
        }
    }

    pub fn go_to_start(&mut self) {
        self.mode = CursorMode::Browsing { ply: 0 };
    }

    pub fn go_to_end(&mut self) {
        self.mode = CursorMode::Live;
    }

    pub fn step_prev(&mut self, total: usize) {
        if total == 0 {
            return;
        }
        let ply = self.ply(total).saturating_sub(1);
        self.mode = CursorMode::Browsing { ply };
    }

    /// Stepping onto the latest move resumes following the live game
    pub fn step_next(&mut self, total: usize) {
        if let CursorMode::Browsing { ply } = self.mode {
            self.mode = if ply + 1 >= total {
                CursorMode::Live
            } else {
                CursorMode::Browsing { ply: ply + 1 }
            };
        }
    }

    pub fn jump_to(&mut self, ply: usize, total: usize) -> Result<(), Rejection> {
        if ply > total {
            return Err(Rejection::OutOfRange { ply, len: total });
        }
        self.mode = CursorMode::Browsing { ply };
        Ok(())
    }

    pub fn apply(&mut self, command: NavCommand, total: usize) -> Result<(), Rejection> {
        match command {
            NavCommand::Start => self.go_to_start(),
            NavCommand::Prev => self.step_prev(total),
            NavCommand::Next => self.step_next(total),
            NavCommand::End => self.go_to_end(),
            NavCommand::Jump(ply) => self.jump_to(ply, total)?,
        }
        Ok(())
    }

    /// Position to display for `record`; never touches the record itself
    pub fn position(&self, record: &GameRecord, rules: &dyn RulesEngine) -> Board {
        match self.mode {
            CursorMode::Live => record.position,
            CursorMode::Browsing { ply } => {
                rules.position_from_moves(&record.moves[..ply.min(record.moves.len())])
            }
        }
    }
}
