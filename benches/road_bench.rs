use criterion::{black_box, criterion_group, criterion_main, Criterion};
use serf_ai::core::types::MapObject;
use serf_ai::placement::{count_objects_near_pos, count_stones_near_pos, ObjectClass};
use serf_ai::road::{find_existing_path, plot_road, PlotConstraints, Road};
use serf_ai::spatial::{spiral_dist, Direction, MapGeometry, MapPos};
use serf_ai::world::{SimWorld, World};

fn open_world(size: u32) -> (SimWorld, MapGeometry) {
    let geom = MapGeometry::new(size, size);
    let mut world = SimWorld::new(geom);
    world.claim_area(geom.pos(size as i32 / 2, size as i32 / 2), size / 2, 0);
    (world, geom)
}

/// Zig-zag chain of short roads between flags
fn road_chain(world: &mut SimWorld, geom: &MapGeometry, start: MapPos, links: usize) -> MapPos {
    let mut flag = start;
    world.place_flag(flag, 0);
    for i in 0..links {
        let dir = if i % 2 == 0 { Direction::Right } else { Direction::DownRight };
        let road = Road::from_dirs(geom, flag, vec![dir; 3]);
        world.place_flag(road.end(), 0);
        world.place_road(&road);
        flag = road.end();
    }
    flag
}

fn bench_roads(c: &mut Criterion) {
    let (mut world, geom) = open_world(128);
    let start = geom.pos(20, 20);
    let end = road_chain(&mut world, &geom, start, 16);

    let mut group = c.benchmark_group("serf-ai/roads");

    group.bench_function("find_existing_path", |b| {
        b.iter(|| black_box(find_existing_path(&world, black_box(start), black_box(end)).is_found()))
    });

    let constraints = PlotConstraints::new(4);
    let target = geom.pos(90, 60);
    group.bench_function("plot_road_open_land", |b| {
        b.iter(|| {
            let plot = plot_road(&world, 0, black_box(geom.pos(30, 80)), black_box(target), &constraints);
            black_box(plot.direct.map(|r| r.len()))
        })
    });

    group.finish();
}

fn bench_spiral(c: &mut Criterion) {
    let geom = MapGeometry::new(128, 128);
    let center = geom.pos(3, 3);

    let mut group = c.benchmark_group("serf-ai/spiral");
    for rings in [4u32, 8, 15] {
        group.bench_function(format!("enumerate_r{}", rings), |b| {
            b.iter(|| black_box(geom.spiral(black_box(center), spiral_dist(rings)).fold(0u32, |acc, p| acc ^ p.0)))
        });
    }
    group.finish();
}

fn bench_scans(c: &mut Criterion) {
    let (mut world, geom) = open_world(96);
    let center = geom.pos(48, 48);
    for (i, pos) in geom.spiral(center, spiral_dist(10)).enumerate() {
        match i % 5 {
            0 => world.set_object(pos, MapObject::Tree(0)),
            1 => world.set_object(pos, MapObject::Stone(3)),
            _ => {}
        }
    }

    let mut group = c.benchmark_group("serf-ai/placement");

    group.bench_function("count_trees_r8", |b| {
        b.iter(|| black_box(count_objects_near_pos(&world, center, spiral_dist(8), ObjectClass::Trees)))
    });

    group.bench_function("count_stones_r8", |b| {
        b.iter(|| black_box(count_stones_near_pos(&world, center, spiral_dist(8))))
    });

    group.bench_function("owned_sites_r8", |b| {
        b.iter(|| {
            black_box(
                geom.spiral(center, spiral_dist(8))
                    .filter(|p| world.can_build_flag(*p, 0))
                    .count(),
            )
        })
    });

    group.finish();
}

criterion_group!(benches, bench_spiral, bench_roads, bench_scans);
criterion_main!(benches);
