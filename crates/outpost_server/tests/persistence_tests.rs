//! Save file round trips.

use outpost_core::prelude::*;
use outpost_server::persistence::{load, load_or_generate, save};
use outpost_test_utils::fixtures::{config, generated_world, host_simulation};
use tempfile::TempDir;

fn host() -> PlayerProfile {
    PlayerProfile {
        name: "Host".to_string(),
        color_index: 0,
    }
}

fn played_world() -> World {
    let mut sim = host_simulation();
    let core = sim.world().core().unwrap().pos;
    assert!(sim.apply_intent(
        PlayerId::HOST,
        &Intent::Place {
            kind: StructureKind::Wall,
            gx: core.gx + 2,
            gy: core.gy - 1,
            orient: Orientation::East,
        }
    ));
    sim.world_mut().waves_mut().set_timer(0.0);
    for _ in 0..120 {
        sim.tick(1.0 / 60.0);
    }
    sim.into_world()
}

#[test]
fn test_save_then_load_restores_world() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("nested").join("save.json");
    let world = played_world();

    save(&path, &world, SessionMode::Host).unwrap();
    let text = std::fs::read_to_string(&path).unwrap();
    assert!(text.contains("\"game_mode_for_save\": \"host\""));
    assert!(text.contains("\"base_terrain\""));

    let (restored, mode) = load(&path, config(), &host()).unwrap();
    assert_eq!(mode, Some(SessionMode::Host));
    assert_eq!(restored.waves().number(), world.waves().number());
    assert_eq!(restored.resources(), world.resources());
    assert_eq!(restored.structures().count(), world.structures().count());
    assert_eq!(restored.enemies().count(), world.enemies().count());
    assert_eq!(restored.terrain().count(), world.terrain().count());
    assert!(restored.player(PlayerId::HOST).is_some());
}

#[test]
fn test_missing_save_generates_new_world() {
    let dir = TempDir::new().unwrap();
    let world = load_or_generate(&dir.path().join("absent.json"), config(), &host());
    let fresh = generated_world();
    assert_eq!(world.waves().number(), 0);
    assert_eq!(world.terrain().count(), fresh.terrain().count());
    assert!(world.core().is_some());
}

#[test]
fn test_corrupt_save_falls_back_to_new_world() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("save.json");
    std::fs::write(&path, "{ this is not a save").unwrap();

    assert!(load(&path, config(), &host()).is_err());
    let world = load_or_generate(&path, config(), &host());
    assert!(world.core().is_some());
    assert!(world.player(PlayerId::HOST).is_some());
    assert_eq!(world.resources(), &ResourceMap::starting());
}

#[test]
fn test_save_with_wrong_field_types_is_rejected() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("save.json");
    std::fs::write(&path, r#"{"resources": {"copper": 1, "coal": 2}, "wave_number": "three"}"#).unwrap();
    assert!(load(&path, config(), &host()).is_err());
}
