use lasso_slicer::{
    slice, LidPattern, MachineToolpath, PathRole, SliceContext, SliceControl, SlicePass,
    SliceSettings, SliceStatus, TriangleMesh,
};

fn cube(size: f32) -> TriangleMesh {
    let s = size;
    TriangleMesh {
        vertices: vec![
            0.0, 0.0, 0.0, s, 0.0, 0.0, s, s, 0.0, 0.0, s, 0.0, //
            0.0, 0.0, s, s, 0.0, s, s, s, s, 0.0, s, s,
        ],
        indices: vec![
            0, 2, 1, 0, 3, 2, // bottom
            4, 5, 6, 4, 6, 7, // top
            0, 1, 5, 0, 5, 4, // front
            2, 3, 7, 2, 7, 6, // back
            0, 4, 7, 0, 7, 3, // left
            1, 2, 6, 1, 6, 5, // right
        ],
        normals: Vec::new(),
    }
}

fn cube_settings() -> SliceSettings {
    SliceSettings {
        layer_height: 0.2,
        shells: 2,
        lids: 1,
        lid_pattern: LidPattern::Zigzag,
        infill_density: 20.0,
        ..Default::default()
    }
}

#[test]
fn cube_has_shells_lids_and_infill() {
    let toolpath = slice(&cube(10.0), &cube_settings()).unwrap();
    assert_eq!(toolpath.layer_count(), 50);

    let last = toolpath.layer_count() - 1;
    for (i, (_, layer)) in toolpath.layers().enumerate() {
        assert_eq!(layer.fragments_with_role(PathRole::Shell).count(), 2, "layer {i}");
        let lids = layer.fragments_with_role(PathRole::Lid).count();
        let infill = layer.fragments_with_role(PathRole::Infill).count();
        if i == 0 || i == last {
            assert_eq!(lids, 1, "layer {i}");
            assert_eq!(infill, 0, "layer {i}");
        } else {
            assert_eq!(lids, 0, "layer {i}");
            assert_eq!(infill, 1, "layer {i}");
        }
        // shells first, then lids, then infill
        let roles: Vec<_> = layer.fragments().iter().map(|f| f.role).collect();
        let mut sorted = roles.clone();
        sorted.sort_by_key(|r| match r {
            PathRole::Shell => 0,
            PathRole::Lid => 1,
            PathRole::Infill => 2,
            PathRole::Other => 3,
        });
        assert_eq!(roles, sorted);
    }
}

#[test]
fn outer_shell_follows_the_cube_outline() {
    let toolpath = slice(&cube(10.0), &cube_settings()).unwrap();
    let layer = toolpath.find_layer(5.0 - 0.02).unwrap();
    let outer = layer.fragments_with_role(PathRole::Shell).next().unwrap();
    for el in &layer.elements()[outer.range.clone()] {
        let m = el.as_motion().unwrap();
        if m.rapid {
            continue;
        }
        // centre line of the outermost extrusion, half a nozzle in
        for p in [m.start, m.end] {
            assert!(p.x > 0.05 && p.x < 9.95, "{p:?}");
            assert!(p.y > 0.05 && p.y < 9.95, "{p:?}");
        }
    }
    assert!(layer.print_length() > 30.0);
}

#[test]
fn layer_keys_are_micrometres() {
    let toolpath = slice(&cube(10.0), &cube_settings()).unwrap();
    let keys: Vec<i64> = toolpath.layers().map(|(k, _)| k.0).collect();
    assert_eq!(keys[0], 180);
    assert_eq!(keys[1], 380);
    assert!(keys.windows(2).all(|w| w[1] - w[0] == 200));
    assert!(toolpath.find_layer(0.1 * 1.8).is_some());
}

#[test]
fn cancel_during_lids_keeps_finished_layers() {
    let mesh = cube(10.0);
    let settings = cube_settings();
    let context = SliceContext::new(&mesh, &settings).unwrap();
    let mut out = MachineToolpath::new();
    let status = context
        .run(&mut out, |p| {
            if p.pass == SlicePass::LidsAndInfill && p.layer == 3 {
                SliceControl::Cancel
            } else {
                SliceControl::Continue
            }
        })
        .unwrap();
    assert_eq!(status, SliceStatus::Cancelled { completed_layers: 3 });
    assert_eq!(out.layer_count(), 3);
}

#[test]
fn cancel_during_shells_leaves_nothing() {
    let mesh = cube(10.0);
    let settings = cube_settings();
    let context = SliceContext::new(&mesh, &settings).unwrap();
    let mut out = MachineToolpath::new();
    let status = context
        .run(&mut out, |p| {
            if p.layer == 3 {
                SliceControl::Cancel
            } else {
                SliceControl::Continue
            }
        })
        .unwrap();
    assert!(matches!(status, SliceStatus::Cancelled { completed_layers } if completed_layers <= 3));
    assert_eq!(out.layer_count(), 0);
}

#[test]
fn concentric_lids_make_rings() {
    let settings = SliceSettings {
        lid_pattern: LidPattern::Concentric,
        lids: 2,
        ..cube_settings()
    };
    let toolpath = slice(&cube(6.0), &settings).unwrap();
    let (_, bottom) = toolpath.layers().next().unwrap();
    let rings: Vec<_> = bottom.fragments_with_role(PathRole::Lid).collect();
    assert!(rings.len() > 2);
    assert!(rings.iter().enumerate().all(|(k, f)| f.order == k));
    // two lids: the second layer is still solid
    let (_, second) = toolpath.layers().nth(1).unwrap();
    assert!(second.fragments_with_role(PathRole::Lid).count() > 0);
    let (_, third) = toolpath.layers().nth(2).unwrap();
    assert_eq!(third.fragments_with_role(PathRole::Lid).count(), 0);
}

#[test]
fn optimize_keeps_print_length() {
    let mut toolpath = slice(&cube(10.0), &cube_settings()).unwrap();
    let before: Vec<_> = toolpath.layers().map(|(_, l)| (l.len(), l.print_length())).collect();
    toolpath.optimize();
    let after: Vec<_> = toolpath.layers().map(|(_, l)| (l.len(), l.print_length())).collect();
    for ((n0, len0), (n1, len1)) in before.iter().zip(&after) {
        assert_eq!(n0, n1);
        assert!((len0 - len1).abs() < 1e-6);
    }
    for (_, layer) in toolpath.layers() {
        let motions: Vec<_> = layer.motions().collect();
        assert!(motions.windows(2).all(|w| w[0].end == w[1].start));
    }
}

#[test]
fn no_shells_no_lids_is_all_infill() {
    let settings = SliceSettings {
        shells: 0,
        lids: 0,
        ..cube_settings()
    };
    let toolpath = slice(&cube(4.0), &settings).unwrap();
    for (_, layer) in toolpath.layers() {
        assert_eq!(layer.fragments().len(), 1);
        assert_eq!(layer.fragments()[0].role, PathRole::Infill);
    }
}
