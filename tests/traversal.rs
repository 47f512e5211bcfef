use crystal_lighter::coverage::shadow_map;
use crystal_lighter::demo::{add_room, two_rooms};
use crystal_lighter::{
    DrawnPolygon, FrustumView, LighterConfig, PolygonDef, PolygonHit, Portal, RenderView, SectorId, Transform,
    TransformManager, World,
};
use glam::{Mat3, Quat, Vec3};
use rand::{rngs::StdRng, Rng, SeedableRng};

/// Room A (x in -4..0) whose east wall leads into room B, which sits 100
/// units further along z and is reached through a translating warp.
fn warped_rooms() -> (World, SectorId, SectorId) {
    let mut world = World::new();
    let a = world.add_sector("A");
    let b = world.add_sector("B");
    let walls_a = add_room(&mut world, a, Vec3::new(-4.0, -2.0, -2.0), Vec3::new(0.0, 2.0, 2.0), &PolygonDef::default())
        .unwrap();
    add_room(&mut world, b, Vec3::new(0.0, -2.0, 98.0), Vec3::new(4.0, 2.0, 102.0), &PolygonDef::default()).unwrap();
    let mut portal = Portal::new(b);
    portal.set_warp(Transform::translation(Vec3::new(0.0, 0.0, -100.0)));
    world.set_portal(walls_a[1], portal).unwrap();
    (world, a, b)
}

fn mirror_box() -> (World, SectorId) {
    let mut world = World::new();
    let s = world.add_sector("box");
    let walls = add_room(&mut world, s, Vec3::splat(-1.0), Vec3::splat(1.0), &PolygonDef::default()).unwrap();
    for &wall in &walls[..2] {
        let mirror = Portal::mirror(s, world.polygon(wall).unwrap());
        world.set_portal(wall, mirror).unwrap();
    }
    (world, s)
}

#[test]
fn mirror_portals_flip_handedness_once_per_crossing() {
    let (world, _) = mirror_box();
    let mirrors: Vec<&Portal> = world.polygons().iter().filter_map(|p| p.portal()).collect();
    assert_eq!(mirrors.len(), 2);
    let mut t = Transform::IDENTITY;
    let mut mirrored = false;
    for (i, mirror) in mirrors.iter().cycle().take(5).enumerate() {
        assert!(mirror.is_mirroring());
        mirror.warp_space(&mut t, &mut mirrored);
        assert_eq!(mirrored, i % 2 == 0);
        assert_eq!(t.is_mirroring(), mirrored);
    }
}

#[test]
fn static_destination_portal_keeps_its_warp() {
    let mut world = World::new();
    let a = world.add_sector("a");
    let b = world.add_sector("b");
    let walls = add_room(&mut world, a, Vec3::splat(-1.0), Vec3::splat(1.0), &PolygonDef::default()).unwrap();
    let warp = Transform::new(Mat3::from_rotation_y(0.7), Vec3::new(3.0, 0.0, 0.0));
    let mut portal = Portal::new(b);
    portal.set_warp(warp);
    portal.set_static_destination(true);
    world.set_portal(walls[1], portal).unwrap();
    let motion = Transform::new(Mat3::from_rotation_z(1.2), Vec3::new(0.0, 5.0, 0.0));
    world.move_portal(walls[1], &motion).unwrap();
    assert_eq!(*world.polygon(walls[1]).unwrap().portal().unwrap().world_warp(), warp);
    assert!(world.move_portal(walls[0], &motion).is_err());
}

#[test]
fn warp_round_trip_returns_points() {
    let mut rng = StdRng::seed_from_u64(42);
    for _ in 0..200 {
        let rotation = Quat::from_euler(
            glam::EulerRot::XYZ,
            rng.gen_range(-3.0..3.0),
            rng.gen_range(-3.0..3.0),
            rng.gen_range(-3.0..3.0),
        );
        let offset = Vec3::new(rng.gen_range(-50.0..50.0), rng.gen_range(-50.0..50.0), rng.gen_range(-50.0..50.0));
        let t = Transform::new(Mat3::from_quat(rotation), offset);
        let p = Vec3::new(rng.gen_range(-10.0..10.0), rng.gen_range(-10.0..10.0), rng.gen_range(-10.0..10.0));
        assert!(t.this_to_other(t.other_to_this(p)).abs_diff_eq(p, 1e-3));
        assert!((t * t.inverse()).approx_eq(&Transform::IDENTITY, 1e-4));
    }
}

#[test]
fn facing_mirrors_stop_the_beam() {
    let (world, s) = mirror_box();
    assert!(world.hit_beam(s, Vec3::ZERO, Vec3::new(100.0, 0.0, 0.0)).is_none());
    // A beam along the mirrors still hits the floor.
    let (floor, point) = world.hit_beam(s, Vec3::ZERO, Vec3::new(0.0, -5.0, 0.0)).unwrap();
    assert_eq!(world.polygon(floor).unwrap().name(), "box.floor");
    assert!(point.abs_diff_eq(Vec3::new(0.0, -1.0, 0.0), 1e-5));
}

#[test]
fn beam_crosses_plain_and_warping_portals() {
    let world = two_rooms(&LighterConfig::default()).unwrap();
    let a = world.find_sector("A").unwrap();
    let (hit, point) = world
        .hit_beam(a, Vec3::new(-2.0, 0.5, 0.0), Vec3::new(10.0, 0.5, 0.0))
        .unwrap();
    assert_eq!(world.polygon(hit).unwrap().name(), "B.east");
    assert!(point.abs_diff_eq(Vec3::new(4.0, 0.5, 0.0), 1e-4));

    let (world, a, _) = warped_rooms();
    let (hit, point) = world
        .hit_beam(a, Vec3::new(-2.0, 0.5, 0.0), Vec3::new(10.0, 0.5, 0.0))
        .unwrap();
    assert_eq!(world.polygon(hit).unwrap().name(), "B.east");
    assert!(point.abs_diff_eq(Vec3::new(4.0, 0.5, 0.0), 1e-4), "hit reported at {point}");
}

#[test]
fn follow_segment_moves_through_a_warp() {
    let (world, a, b) = warped_rooms();
    let mut t = Transform::IDENTITY;
    let mut pos = Vec3::new(2.0, 0.0, 0.0);
    let mut mirror = false;
    let end = world.follow_segment(a, Vec3::new(-2.0, 0.0, 0.0), &mut t, &mut pos, &mut mirror);
    assert_eq!(end, b);
    assert!(pos.abs_diff_eq(Vec3::new(2.0, 0.0, 100.0), 1e-4));
    assert!(!mirror);
}

#[test]
fn draw_reaches_the_next_room_and_restores_frames() {
    let world = two_rooms(&LighterConfig::default()).unwrap();
    let a = world.find_sector("A").unwrap();
    let b = world.find_sector("B").unwrap();
    let mut drawn: Vec<DrawnPolygon> = Vec::new();
    let mut tm = TransformManager::new();
    let stats = world.draw(a, RenderView::new(Transform::translation(Vec3::new(-2.0, 0.5, 0.0))), &mut drawn, &mut tm);
    assert_eq!(stats.portals_drawn, 1);
    assert_eq!(stats.max_depth, 1);
    assert!(drawn.iter().any(|d| d.sector == b && d.depth == 1));
    assert!(drawn.iter().all(|d| !d.mirrored));
    assert_eq!(tm.frames_created(), 0);

    let (world, a, b) = warped_rooms();
    let mut drawn: Vec<DrawnPolygon> = Vec::new();
    let mut tm = TransformManager::new();
    world.draw(a, RenderView::new(Transform::translation(Vec3::new(-2.0, 0.5, 0.0))), &mut drawn, &mut tm);
    assert_eq!(tm.frames_created(), 1);
    assert_eq!(tm.open_frames(), 0);
    // B's far wall is straight ahead of the camera, 6 units away.
    let east = world.find_polygon("B.east").unwrap();
    let far = drawn.iter().find(|d| d.polygon == east && d.sector == b).unwrap();
    assert!(far.vertices.iter().all(|v| (v.x - 6.0).abs() < 1e-3));
}

#[test]
fn facing_mirrors_draw_to_the_depth_limit() {
    let (world, s) = mirror_box();
    let mut drawn: Vec<DrawnPolygon> = Vec::new();
    let mut tm = TransformManager::new();
    let stats = world.draw(s, RenderView::new(Transform::IDENTITY), &mut drawn, &mut tm);
    assert!(stats.max_depth <= world.max_portal_depth());
    assert!(stats.max_depth >= 1);
    assert!(drawn.iter().any(|d| d.mirrored));
    assert_eq!(tm.open_frames(), 0);
}

#[test]
fn light_passes_tinted_portal_and_stops_at_black_one() {
    let mut world = two_rooms(&LighterConfig::default()).unwrap();
    let a = world.find_sector("A").unwrap();
    let b = world.find_sector("B").unwrap();
    let door = world.find_polygon("A.east").unwrap();
    world
        .polygon_mut(door)
        .unwrap()
        .portal_mut()
        .unwrap()
        .set_filter(Vec3::new(0.5, 1.0, 0.0));

    let mut filters = Vec::new();
    world.check_frustum(a, FrustumView::new(Vec3::new(-2.0, 1.0, 0.0), 50.0), &mut |_: &World, hit: &PolygonHit| {
        if hit.sector == b {
            filters.push(hit.view.filter);
        }
    });
    assert_eq!(filters.len(), 5);
    assert!(filters.iter().all(|f| f.abs_diff_eq(Vec3::new(0.5, 1.0, 0.0), 1e-6)));

    world.polygon_mut(door).unwrap().portal_mut().unwrap().set_filter(Vec3::ZERO);
    let mut reached_b = 0;
    world.check_frustum(a, FrustumView::new(Vec3::new(-2.0, 1.0, 0.0), 50.0), &mut |_: &World, hit: &PolygonHit| {
        if hit.sector == b {
            reached_b += 1;
        }
    });
    assert_eq!(reached_b, 0);
}

/// Room A lit from (-3, 0, 0) with a small caster plate between the light
/// and the doorway into room B. With `warped` room B sits 100 units along z.
fn shadowed_rooms(warped: bool) -> (World, SectorId) {
    let mut world = World::new();
    world.set_lightcell_size(16);
    let a = world.add_sector("A");
    let b = world.add_sector("B");
    let shift = if warped { 100.0 } else { 0.0 };
    let walls_a = add_room(&mut world, a, Vec3::new(-4.0, -2.0, -2.0), Vec3::new(0.0, 2.0, 2.0), &PolygonDef::default())
        .unwrap();
    add_room(
        &mut world,
        b,
        Vec3::new(0.0, -2.0, shift - 2.0),
        Vec3::new(4.0, 2.0, shift + 2.0),
        &PolygonDef::default(),
    )
    .unwrap();
    let mut portal = Portal::new(b);
    if warped {
        portal.set_warp(Transform::translation(Vec3::new(0.0, 0.0, -shift)));
    }
    world.set_portal(walls_a[1], portal).unwrap();

    // Casts a shadow spanning -1.5..1.5 on B's far wall.
    let h = 1.5 / 14.0;
    let mut plate = PolygonDef::new(
        "A.plate",
        vec![
            Vec3::new(-2.5, -h, -h),
            Vec3::new(-2.5, -h, h),
            Vec3::new(-2.5, h, h),
            Vec3::new(-2.5, h, -h),
        ],
    );
    plate.shadow_caster = true;
    plate.lightmapped = false;
    world.add_polygon(a, plate).unwrap();
    (world, a)
}

fn far_wall_visibility(world: &World, a: SectorId) -> (usize, Vec<f32>) {
    let east = world.find_polygon("B.east").unwrap();
    let mut seen = None;
    world.check_frustum(a, FrustumView::new(Vec3::new(-3.0, 0.0, 0.0), 50.0), &mut |world: &World, hit: &PolygonHit| {
        if hit.polygon == east {
            let poly = world.polygon(east).unwrap();
            let map = shadow_map(&hit.view.light_frustum, hit.view.shadows.iter(), poly.vertices(), poly.lightmap().unwrap());
            seen = Some((hit.view.shadows.len(), map));
        }
    });
    seen.unwrap()
}

#[test]
fn shadows_follow_the_light_through_a_warp() {
    let (plain, a) = shadowed_rooms(false);
    let (shadows, expected) = far_wall_visibility(&plain, a);
    assert_eq!(shadows, 1);
    assert!(expected.iter().any(|&v| v < 0.01));
    assert!(expected.iter().any(|&v| v > 0.4));

    let (warped, a) = shadowed_rooms(true);
    let (shadows, visibility) = far_wall_visibility(&warped, a);
    assert_eq!(shadows, 1);
    assert_eq!(visibility.len(), expected.len());
    for (got, want) in visibility.iter().zip(&expected) {
        assert!((got - want).abs() < 1e-3, "{visibility:?} vs {expected:?}");
    }
}
