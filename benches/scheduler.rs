//! Scheduler throughput benchmarks
//!
//! Measures one outer update across increasing numbers of concurrently
//! running instances, plus raw entity-world stepping.
//!
//! Run with: cargo bench --bench scheduler

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use gridsync_server::config::ServerConfig;
use gridsync_server::game::grid::{CellCoord, GridDirection, GridMap};
use gridsync_server::game::world::{EntityWorld, SpawnRequest, VisualKind};
use gridsync_server::ServerContext;
use rand::Rng;

const PLAYERS_PER_SESSION: u64 = 4;

const DIRECTIONS: [GridDirection; 4] = [
    GridDirection::Up,
    GridDirection::Down,
    GridDirection::Left,
    GridDirection::Right,
];

/// Context with `sessions` running games of four moving players each
fn context_with_running_games(sessions: u64) -> ServerContext {
    let config = ServerConfig {
        max_sessions: sessions as usize + 1,
        max_players_per_session: PLAYERS_PER_SESSION as usize,
        ..Default::default()
    };
    let ctx = ServerContext::new(config).expect("valid bench config");
    let mut rng = rand::thread_rng();

    for s in 0..sessions {
        let name = format!("bench-{}", s);
        let host = s * PLAYERS_PER_SESSION + 1;
        ctx.sessions.create_session(host, &name, None).expect("create session");
        for client in host..host + PLAYERS_PER_SESSION {
            if client != host {
                ctx.sessions.join_session(client, &name, None).expect("join session");
            }
            ctx.sessions.set_ready(client, &name, true).expect("ready");
        }
        ctx.sessions.start_game(host, &name).expect("start game");
        for client in host..host + PLAYERS_PER_SESSION {
            let direction = DIRECTIONS[rng.gen_range(0..DIRECTIONS.len())];
            ctx.scheduler.set_player_input(&name, client, direction);
        }
    }
    ctx
}

fn bench_scheduler_update(c: &mut Criterion) {
    let mut group = c.benchmark_group("scheduler_update");
    group.sample_size(50);

    for sessions in [1u64, 10, 50, 100] {
        let ctx = context_with_running_games(sessions);
        let step = ctx.scheduler.sim_step();

        group.throughput(Throughput::Elements(sessions * PLAYERS_PER_SESSION));
        group.bench_with_input(BenchmarkId::new("instances", sessions), &sessions, |b, _| {
            b.iter(|| {
                black_box(ctx.update(black_box(step)));
                if let Some(outbound) = &ctx.outbound {
                    outbound.try_iter().for_each(drop);
                }
            })
        });
    }
    group.finish();
}

fn bench_world_step(c: &mut Criterion) {
    let mut group = c.benchmark_group("world_step");
    group.sample_size(50);

    for count in [16u32, 64, 256, 1024] {
        let grid = GridMap::empty("bench", 64, 64, 1.0);
        let mut world = EntityWorld::new();
        let mut rng = rand::thread_rng();
        for i in 0..count {
            let owner = u64::from(i) + 1;
            world
                .spawn(SpawnRequest {
                    owner,
                    owner_uid: format!("uid-{}", owner),
                    display_name: format!("Player {}", owner),
                    color_index: (i % 8) as u8,
                    visual: VisualKind::Square,
                    cell: CellCoord::new(rng.gen_range(0..64), rng.gen_range(0..64)),
                })
                .expect("unique owner");
            world.set_input(owner, DIRECTIONS[rng.gen_range(0..DIRECTIONS.len())]);
        }

        group.throughput(Throughput::Elements(u64::from(count)));
        group.bench_with_input(BenchmarkId::new("entities", count), &count, |b, _| {
            let mut dirty = Vec::with_capacity(count as usize);
            b.iter(|| {
                world.step(black_box(1.0 / 60.0), 5.0, &grid);
                world.collect_dirty(&mut dirty);
                world.clear_dirty();
                black_box(dirty.len())
            })
        });
    }
    group.finish();
}

criterion_group!(benches, bench_scheduler_update, bench_world_step);
criterion_main!(benches);
