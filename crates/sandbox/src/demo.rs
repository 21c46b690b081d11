//! Built-in demo game: collect coins on a grid.
//!
//! Used as the fallback module for the native runtime and by tests that
//! need a well-behaved game.

use serde_json::{json, Value};

use playgate_core::Action;

use crate::context::{SandboxContext, TimerId};
use crate::module::{GameModule, ModuleResult};

const GRID: i64 = 8;
const MAX_MOVES: u32 = 64;
const COIN_POINTS: f64 = 10.0;
const BONUS_POINTS: f64 = 25.0;
/// Coins collected before this much game time pay the bonus.
const BONUS_WINDOW_MS: f64 = 2_000.0;

pub struct DemoGame {
    player: (i64, i64),
    coin: (i64, i64),
    score: f64,
    moves: u32,
    coins: u32,
    started: bool,
    paused: bool,
    bonus: bool,
    bonus_timer: Option<TimerId>,
}

impl DemoGame {
    pub fn new() -> Self {
        Self {
            player: (0, 0),
            coin: (GRID - 1, GRID - 1),
            score: 0.0,
            moves: 0,
            coins: 0,
            started: false,
            paused: false,
            bonus: false,
            bonus_timer: None,
        }
    }

    fn ended(&self) -> bool {
        self.moves >= MAX_MOVES
    }

    fn place_coin(&mut self, ctx: &mut SandboxContext) {
        loop {
            let coin = (ctx.random().range(0, GRID), ctx.random().range(0, GRID));
            if coin != self.player {
                self.coin = coin;
                return;
            }
        }
    }

    fn arm_bonus(&mut self, ctx: &mut SandboxContext) {
        if let Some(timer) = self.bonus_timer.take() {
            ctx.timers().clear_timeout(timer);
        }
        self.bonus_timer = ctx.timers().set_timeout(BONUS_WINDOW_MS);
        self.bonus = self.bonus_timer.is_some();
    }

    fn draw(&self, ctx: &mut SandboxContext) {
        let surface = ctx.surface();
        let cell = (surface.width().min(surface.height()) as f64) / GRID as f64;
        surface.clear([16, 16, 24, 255]);
        surface.circle(
            (self.coin.0 as f64 + 0.5) * cell,
            (self.coin.1 as f64 + 0.5) * cell,
            cell * 0.3,
            if self.bonus {
                [255, 215, 0, 255]
            } else {
                [200, 170, 60, 255]
            },
        );
        surface.fill_rect(
            self.player.0 as f64 * cell + 2.0,
            self.player.1 as f64 * cell + 2.0,
            cell - 4.0,
            cell - 4.0,
            [80, 200, 255, 255],
        );
        surface.text(4.0, 4.0, 14.0, format!("score {}", self.score), [255; 4]);
        if self.paused {
            surface.text(4.0, 22.0, 14.0, "paused", [255, 120, 120, 255]);
        }
    }
}

impl Default for DemoGame {
    fn default() -> Self {
        Self::new()
    }
}

impl GameModule for DemoGame {
    fn init(&mut self, ctx: &mut SandboxContext) -> ModuleResult<()> {
        self.place_coin(ctx);
        self.draw(ctx);
        Ok(())
    }

    fn start(&mut self, ctx: &mut SandboxContext) -> ModuleResult<()> {
        if !self.started {
            self.started = true;
            self.arm_bonus(ctx);
        }
        self.paused = false;
        self.draw(ctx);
        Ok(())
    }

    fn reset(&mut self, ctx: &mut SandboxContext) -> ModuleResult<()> {
        let started = self.started;
        *self = Self::new();
        self.place_coin(ctx);
        if started {
            self.started = true;
            self.arm_bonus(ctx);
        }
        self.draw(ctx);
        Ok(())
    }

    fn read_state(&self) -> ModuleResult<Value> {
        Ok(json!({
            "score": self.score,
            "ended": self.ended(),
            "moves": self.moves,
            "coins": self.coins,
            "paused": self.paused,
            "player": [self.player.0, self.player.1],
            "coin": [self.coin.0, self.coin.1],
        }))
    }

    fn dispatch_input(&mut self, ctx: &mut SandboxContext, action: Action) -> ModuleResult<bool> {
        if !self.started || self.ended() {
            return Ok(false);
        }
        if action == Action::Pause {
            self.paused = !self.paused;
            ctx.frames().request_frame();
            return Ok(true);
        }
        if self.paused {
            return Ok(false);
        }

        let (dx, dy) = match action {
            Action::Up => (0, -1),
            Action::Down => (0, 1),
            Action::Left => (-1, 0),
            Action::Right => (1, 0),
            _ => return Ok(false),
        };
        let next = (self.player.0 + dx, self.player.1 + dy);
        if !(0..GRID).contains(&next.0) || !(0..GRID).contains(&next.1) {
            return Ok(false);
        }

        self.player = next;
        self.moves += 1;
        if self.player == self.coin {
            self.score += if self.bonus { BONUS_POINTS } else { COIN_POINTS };
            self.coins += 1;
            self.place_coin(ctx);
            self.arm_bonus(ctx);
        }
        ctx.frames().request_frame();
        Ok(true)
    }

    fn read_meta(&self) -> ModuleResult<Value> {
        Ok(json!({
            "name": "Coin Grid",
            "description": "Walk the grid and collect coins. Quick pickups pay a bonus.",
            "controls": {
                "up": "move up",
                "down": "move down",
                "left": "move left",
                "right": "move right",
                "pause": "pause or resume"
            },
            "maxMoves": MAX_MOVES,
        }))
    }

    fn on_frame(&mut self, ctx: &mut SandboxContext, _dt_ms: f64) -> ModuleResult<()> {
        self.draw(ctx);
        Ok(())
    }

    fn on_timer(&mut self, _ctx: &mut SandboxContext, timer: TimerId) -> ModuleResult<()> {
        if self.bonus_timer == Some(timer) {
            self.bonus_timer = None;
            self.bonus = false;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::test_context;

    fn started() -> (DemoGame, SandboxContext) {
        let mut ctx = test_context(&[]);
        let mut game = DemoGame::new();
        game.init(&mut ctx).unwrap();
        game.start(&mut ctx).unwrap();
        (game, ctx)
    }

    #[test]
    fn test_inputs_rejected_before_start() {
        let mut ctx = test_context(&[]);
        let mut game = DemoGame::new();
        game.init(&mut ctx).unwrap();
        assert!(!game.dispatch_input(&mut ctx, Action::Right).unwrap());
    }

    #[test]
    fn test_walls_and_unused_actions() {
        let (mut game, mut ctx) = started();
        assert!(!game.dispatch_input(&mut ctx, Action::Up).unwrap());
        assert!(!game.dispatch_input(&mut ctx, Action::Left).unwrap());
        assert!(!game.dispatch_input(&mut ctx, Action::Action).unwrap());
        assert!(game.dispatch_input(&mut ctx, Action::Right).unwrap());
    }

    #[test]
    fn test_pause_toggles_and_blocks_moves() {
        let (mut game, mut ctx) = started();
        assert!(game.dispatch_input(&mut ctx, Action::Pause).unwrap());
        assert!(!game.dispatch_input(&mut ctx, Action::Down).unwrap());
        assert!(game.dispatch_input(&mut ctx, Action::Pause).unwrap());
        assert!(game.dispatch_input(&mut ctx, Action::Down).unwrap());
    }

    #[test]
    fn test_game_ends_after_move_budget() {
        let (mut game, mut ctx) = started();
        let mut accepted = 0;
        for i in 0..200 {
            let action = if (i / (GRID - 1)) % 2 == 0 {
                Action::Right
            } else {
                Action::Left
            };
            if game.dispatch_input(&mut ctx, action).unwrap() {
                accepted += 1;
            } else {
                let _ = game.dispatch_input(&mut ctx, Action::Down).unwrap()
                    || game.dispatch_input(&mut ctx, Action::Up).unwrap();
            }
        }
        assert!(accepted > 0);
        let state = game.read_state().unwrap();
        assert_eq!(state["ended"], true);
        assert_eq!(state["moves"], MAX_MOVES);
        assert!(!game.dispatch_input(&mut ctx, Action::Right).unwrap());
    }

    #[test]
    fn test_bonus_expires_on_timer() {
        let (mut game, mut ctx) = started();
        assert!(game.bonus);
        for timer in ctx.advance_clock(BONUS_WINDOW_MS) {
            game.on_timer(&mut ctx, timer).unwrap();
        }
        assert!(!game.bonus);
    }

    #[test]
    fn test_meta_is_stable() {
        let game = DemoGame::new();
        assert_eq!(game.read_meta().unwrap(), game.read_meta().unwrap());
    }
}
