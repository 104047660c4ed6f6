use criterion::{black_box, criterion_group, criterion_main, Criterion};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use stickfight_core::resolver::{TurnInput, TurnResolver};
use stickfight_core::rules::{ActionId, BuffId, Ruleset};
use stickfight_core::session::SessionBuilder;
use stickfight_core::side::{PerSide, SideState};
use stickfight_store::MemoryStore;

fn bench_resolve_attacks(c: &mut Criterion) {
    let rules = Ruleset::standard();
    let resolver = TurnResolver::new(&rules);
    let input = TurnInput {
        actions: PerSide::new(ActionId::new("heavy"), ActionId::new("special")),
        state: PerSide::new(SideState::fresh(100), SideState::fresh(100)),
    };
    let mut rng = ChaCha8Rng::seed_from_u64(1);

    c.bench_function("resolve_attacks", |b| {
        b.iter(|| black_box(resolver.resolve(black_box(&input), &mut rng)))
    });
}

fn bench_resolve_with_timers(c: &mut Criterion) {
    let rules = Ruleset::standard();
    let resolver = TurnResolver::new(&rules);
    // Both sides carry buffs and cooldowns so every map is ticked.
    let mut host = SideState::fresh(80);
    host.buffs.set(BuffId::new("speed_boost"), 2);
    host.cooldowns.set(ActionId::new("heavy"), 1);
    let mut guest = SideState::fresh(60);
    guest.buffs.set(BuffId::new("defense_buff"), 2);
    guest.cooldowns.set(ActionId::new("special"), 3);
    let input = TurnInput {
        actions: PerSide::new(ActionId::new("light"), ActionId::new("shield")),
        state: PerSide::new(host, guest),
    };
    let mut rng = ChaCha8Rng::seed_from_u64(2);

    c.bench_function("resolve_with_timers", |b| {
        b.iter(|| black_box(resolver.resolve(black_box(&input), &mut rng)))
    });
}

fn bench_session_turn(c: &mut Criterion) {
    // Full round trip through the store: two submissions, resolution, sync.
    let store = MemoryStore::new();
    let (mut host, allocation) = SessionBuilder::new()
        .seed(3)
        .host(store.clone(), "Ann", "bench")
        .expect("host");
    let mut guest = SessionBuilder::new()
        .join(store, "Bob", allocation.session_id.as_str())
        .expect("join")
        .into_participant()
        .expect("room exists");
    host.poll().expect("poll");
    guest.poll().expect("poll");
    let run = ActionId::new("run");

    c.bench_function("session_turn", |b| {
        b.iter(|| {
            let _ = host.submit_action(&run).expect("submit");
            let _ = guest.submit_action(&run).expect("submit");
            black_box(host.poll().expect("poll"));
            black_box(guest.poll().expect("poll"));
        })
    });
}

criterion_group!(
    benches,
    bench_resolve_attacks,
    bench_resolve_with_timers,
    bench_session_turn
);
criterion_main!(benches);
