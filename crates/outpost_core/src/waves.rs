//! Wave/spawn director.
//!
//! A small state machine driven once per authoritative tick:
//!
//! ```text
//! Cooldown --timer<=0 && number<max--> InWave --timer<=0 | (quota spawned && none alive)--> Cooldown
//!                                                        \-- after the last wave --> AllWavesCleared
//! ```
//!
//! The director only decides *when* to spawn; the world picks the spawn point.

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::enemy::enemy_hp_for_wave;

/// Seconds a wave lasts at most.
pub const WAVE_DURATION: f32 = 40.0;
/// Seconds between waves.
pub const WAVE_COOLDOWN: f32 = 30.0;
/// Shortest gap between two spawns.
pub const MIN_SPAWN_INTERVAL: f32 = 0.1;
/// Spawn gap jitter range, as a multiplier of the base gap.
pub const SPAWN_JITTER: (f32, f32) = (0.7, 1.3);

/// Enemies spawned during `wave`.
#[must_use]
pub fn wave_quota(wave: u32) -> u32 {
    10 + 5 * wave
}

/// Director phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WavePhase {
    /// Counting down to the next wave.
    Cooldown,
    /// Spawning and fighting.
    InWave,
    /// Every wave has been started and none is running.
    AllWavesCleared,
}

/// How a wave ended. Purely informational.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaveEnd {
    /// Quota spawned and every enemy dead.
    Cleared,
    /// Wave timer ran out.
    TimedOut,
}

/// Synced wave state, the `data` of `wave_update`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WaveState {
    /// Current wave number; 0 before the first wave.
    pub number: u32,
    /// Seconds left in the current phase.
    pub timer: f32,
    /// Whether a wave is running.
    pub in_wave: bool,
}

/// What happened during one director step.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WaveStep {
    /// A new wave began this step.
    pub started: bool,
    /// One enemy should be spawned.
    pub spawn: bool,
    /// The running wave ended this step.
    pub ended: Option<WaveEnd>,
}

/// Wave scheduling state.
#[derive(Debug, Clone, PartialEq)]
pub struct WaveDirector {
    number: u32,
    timer: f32,
    in_wave: bool,
    max_waves: u32,
    quota: u32,
    spawned: u32,
    spawn_timer: f32,
    enemy_hp: f32,
}

impl WaveDirector {
    /// Director before the first wave, with a full cooldown ahead.
    #[must_use]
    pub fn new(max_waves: u32) -> Self {
        Self {
            number: 0,
            timer: WAVE_COOLDOWN,
            in_wave: false,
            max_waves,
            quota: 0,
            spawned: 0,
            spawn_timer: 0.0,
            enemy_hp: enemy_hp_for_wave(1),
        }
    }

    /// Current phase.
    #[must_use]
    pub fn phase(&self) -> WavePhase {
        if self.in_wave {
            WavePhase::InWave
        } else if self.number >= self.max_waves {
            WavePhase::AllWavesCleared
        } else {
            WavePhase::Cooldown
        }
    }

    /// Current wave number.
    #[must_use]
    pub fn number(&self) -> u32 {
        self.number
    }

    /// Seconds left in the current phase.
    #[must_use]
    pub fn timer(&self) -> f32 {
        self.timer
    }

    /// Whether a wave is running.
    #[must_use]
    pub fn in_wave(&self) -> bool {
        self.in_wave
    }

    /// Total waves.
    #[must_use]
    pub fn max_waves(&self) -> u32 {
        self.max_waves
    }

    /// Hit points for enemies spawned now.
    #[must_use]
    pub fn enemy_hp(&self) -> f32 {
        self.enemy_hp
    }

    /// Enemies still to spawn this wave.
    #[must_use]
    pub fn remaining_spawns(&self) -> u32 {
        self.quota.saturating_sub(self.spawned)
    }

    /// True once every wave was started, none is running and nothing is alive.
    #[must_use]
    pub fn all_waves_cleared(&self, enemies_alive: usize) -> bool {
        self.phase() == WavePhase::AllWavesCleared && enemies_alive == 0
    }

    /// Force the cooldown timer, e.g. to start the first wave immediately.
    pub fn set_timer(&mut self, timer: f32) {
        self.timer = timer;
    }

    /// Advance by `dt`. `enemies_alive` is the count before any spawn this step.
    pub fn advance<R: Rng>(&mut self, dt: f32, enemies_alive: usize, rng: &mut R) -> WaveStep {
        let mut step = WaveStep::default();
        self.timer -= dt;

        if !self.in_wave && self.timer <= 0.0 && self.number < self.max_waves {
            self.number += 1;
            self.in_wave = true;
            self.quota = wave_quota(self.number);
            self.spawned = 0;
            self.spawn_timer = 0.0;
            self.timer = WAVE_DURATION;
            self.enemy_hp = enemy_hp_for_wave(self.number);
            step.started = true;
        }

        if self.in_wave && self.spawned < self.quota {
            self.spawn_timer -= dt;
            if self.spawn_timer <= 0.0 {
                self.spawned += 1;
                step.spawn = true;
                let base = WAVE_DURATION / self.quota as f32;
                let jitter = rng.gen_range(SPAWN_JITTER.0..=SPAWN_JITTER.1);
                self.spawn_timer = (base * jitter).max(MIN_SPAWN_INTERVAL);
            }
        }

        if self.in_wave && !step.started {
            let cleared = self.spawned >= self.quota && enemies_alive == 0 && !step.spawn;
            let ended = if self.timer <= 0.0 {
                Some(WaveEnd::TimedOut)
            } else if cleared {
                Some(WaveEnd::Cleared)
            } else {
                None
            };
            if ended.is_some() {
                self.in_wave = false;
                self.timer = WAVE_COOLDOWN;
                step.ended = ended;
            }
        }

        step
    }

    /// Synced view.
    #[must_use]
    pub fn state(&self) -> WaveState {
        WaveState {
            number: self.number,
            timer: self.timer,
            in_wave: self.in_wave,
        }
    }

    /// Overwrite from synced state; enemy hp follows the wave number.
    pub fn apply_state(&mut self, state: &WaveState) {
        self.number = state.number;
        self.timer = state.timer;
        self.in_wave = state.in_wave;
        self.enemy_hp = enemy_hp_for_wave(self.number.max(1));
        if self.in_wave {
            // Spawn progress is not synced; a restored wave does not respawn its quota.
            self.quota = wave_quota(self.number);
            self.spawned = self.quota;
        }
    }
}

#[cfg(test)]
mod tests {
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    use super::*;

    #[test]
    fn test_first_wave_starts_when_timer_expires() {
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let mut waves = WaveDirector::new(20);
        waves.set_timer(0.0);

        let step = waves.advance(0.016, 0, &mut rng);
        assert!(step.started);
        assert!(step.spawn);
        assert_eq!(waves.number(), 1);
        assert!(waves.in_wave());
        assert_eq!(waves.enemy_hp(), 50.0);
        assert_eq!(waves.remaining_spawns(), 14);
    }

    #[test]
    fn test_spawn_gaps_stay_within_jitter() {
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        let mut waves = WaveDirector::new(20);
        waves.set_timer(0.0);
        let base = WAVE_DURATION / wave_quota(1) as f32;

        let mut spawns = 0;
        waves.advance(0.01, 1, &mut rng);
        while waves.in_wave {
            if waves.advance(0.01, 1, &mut rng).spawn {
                spawns += 1;
                assert!(waves.spawn_timer >= base * SPAWN_JITTER.0 - 1e-4);
                assert!(waves.spawn_timer <= base * SPAWN_JITTER.1 + 1e-4);
            }
        }
        assert_eq!(waves.number(), 1);
        assert!(spawns >= 10);
    }

    #[test]
    fn test_spawn_gap_has_floor() {
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        let mut waves = WaveDirector::new(1000);
        waves.number = 999;
        waves.set_timer(0.0);

        let step = waves.advance(0.01, 0, &mut rng);
        assert!(step.spawn);
        assert!(WAVE_DURATION / waves.quota as f32 * SPAWN_JITTER.1 < MIN_SPAWN_INTERVAL);
        assert!((waves.spawn_timer - MIN_SPAWN_INTERVAL).abs() < 1e-6);
    }

    #[test]
    fn test_wave_times_out() {
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let mut waves = WaveDirector::new(20);
        waves.set_timer(0.0);
        waves.advance(0.1, 0, &mut rng);

        let step = waves.advance(WAVE_DURATION, 5, &mut rng);
        assert_eq!(step.ended, Some(WaveEnd::TimedOut));
        assert_eq!(waves.phase(), WavePhase::Cooldown);
        assert_eq!(waves.timer(), WAVE_COOLDOWN);
    }

    #[test]
    fn test_wave_cleared_after_quota() {
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        let mut waves = WaveDirector::new(20);
        waves.set_timer(0.0);
        waves.advance(0.1, 0, &mut rng);
        // Keep the wave from timing out while the quota drains.
        waves.set_timer(1000.0);

        let mut spawned = 1;
        while waves.remaining_spawns() > 0 {
            if waves.advance(1.0, spawned, &mut rng).spawn {
                spawned += 1;
            }
        }
        assert!(waves.in_wave());
        let step = waves.advance(0.01, 0, &mut rng);
        assert_eq!(step.ended, Some(WaveEnd::Cleared));
    }

    #[test]
    fn test_no_wave_past_max() {
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let mut waves = WaveDirector::new(1);
        waves.set_timer(0.0);
        waves.advance(0.1, 0, &mut rng);
        waves.advance(WAVE_DURATION, 0, &mut rng);
        assert_eq!(waves.phase(), WavePhase::AllWavesCleared);

        let step = waves.advance(WAVE_COOLDOWN + 1.0, 0, &mut rng);
        assert!(!step.started);
        assert!(waves.all_waves_cleared(0));
        assert!(!waves.all_waves_cleared(2));
    }

    #[test]
    fn test_apply_state_recomputes_enemy_hp() {
        let mut waves = WaveDirector::new(20);
        waves.apply_state(&WaveState {
            number: 4,
            timer: 12.0,
            in_wave: false,
        });
        assert_eq!(waves.enemy_hp(), 110.0);
        assert_eq!(waves.state().timer, 12.0);
    }
}
