//! Toolpath serialization.

use std::io::Write;

use lasso_math::Point3;
use lasso_slicer::{MachineToolpath, Motion, Toolpath, ToolpathElement};

use crate::error::Result;
use crate::writer::GcodeWriter;

/// Filament pulled out of the idle extruder on a tool change (mm).
pub const TOOL_CHANGE_RETRACT: f64 = 4.0;

/// X of the wipe pattern printed by tool 0 (mm).
pub const WIPE_X: f64 = 48.0;

/// X offset of the wipe pattern per tool index (mm).
pub const WIPE_X_STEP: f64 = 52.0;

/// Y where the wipe pattern starts (mm).
pub const WIPE_Y: f64 = 10.0;

/// Length of each wipe stroke (mm).
pub const WIPE_WIDTH: f64 = 20.0;

/// Number of wipe zigzags.
pub const WIPE_STROKES: u32 = 4;

/// Write a complete print: init macro, startup path, every layer,
/// shutdown path and shutdown macro.
pub fn write_machine_toolpath<W: Write>(
    w: &mut GcodeWriter<'_, W>,
    toolpath: &MachineToolpath,
) -> Result<()> {
    w.macro_init()?;
    if let Some(startup) = toolpath.startup() {
        write_toolpath(w, startup)?;
    }
    for (key, layer) in toolpath.layers() {
        w.comment("")?;
        w.comment(&format!("==== layer at z={}", key.z()))?;
        w.comment("")?;
        w.reset_extruder()?;
        write_toolpath(w, layer)?;
    }
    if let Some(shutdown) = toolpath.shutdown() {
        write_toolpath(w, shutdown)?;
    }
    w.macro_shutdown()
}

/// Write every element of one toolpath.
pub fn write_toolpath<W: Write>(w: &mut GcodeWriter<'_, W>, toolpath: &Toolpath) -> Result<()> {
    w.comment("send generated toolpath")?;
    for element in toolpath.elements() {
        write_element(w, element)?;
    }
    Ok(())
}

/// Write a single element.
pub fn write_element<W: Write>(w: &mut GcodeWriter<'_, W>, element: &ToolpathElement) -> Result<()> {
    match element {
        ToolpathElement::Motion(m) => write_motion(w, m),
        ToolpathElement::ExtruderChange { tool } => write_extruder_change(w, *tool),
    }
}

/// Retract, move to `to` without extruding, un-retract.
fn travel<W: Write>(w: &mut GcodeWriter<'_, W>, to: Point3) -> Result<()> {
    let retract = w.settings().retraction_distance;
    w.extrude(-retract)?;
    w.rapid_move(to)?;
    w.extrude(retract)
}

fn write_motion<W: Write>(w: &mut GcodeWriter<'_, W>, m: &Motion) -> Result<()> {
    if m.rapid {
        return travel(w, m.end);
    }
    if !w.is_at(&m.start) {
        travel(w, m.start)?;
    }
    w.move_to(m.end, m.color)
}

fn write_extruder_change<W: Write>(w: &mut GcodeWriter<'_, W>, tool: u32) -> Result<()> {
    w.comment("")?;
    w.comment(&format!("---- Change to extruder {tool}"))?;

    let previous = w.tool();
    w.select_extruder(previous)?;
    w.reset_extruder()?;
    w.extrude(-TOOL_CHANGE_RETRACT)?;

    w.select_extruder(tool)?;
    w.reset_extruder()?;
    w.extrude(TOOL_CHANGE_RETRACT)?;

    // prime the new nozzle on a small zigzag off to the side
    let x = WIPE_X + WIPE_X_STEP * f64::from(tool);
    w.rapid_move_xy(x, WIPE_Y)?;
    for i in 0..WIPE_STROKES {
        let y = WIPE_Y + f64::from(i);
        w.move_xy(x + WIPE_WIDTH, y)?;
        w.move_xy(x + WIPE_WIDTH, y + 0.5)?;
        w.move_xy(x, y + 0.5)?;
        w.move_xy(x, y + 1.0)?;
    }

    w.reset_extruder()?;
    w.comment(&format!("Extruder {tool} ready"))?;
    w.comment("")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::GcodeSettings;

    fn render(toolpath: &Toolpath) -> String {
        let settings = GcodeSettings::default();
        let mut w = GcodeWriter::new(Vec::new(), &settings);
        write_toolpath(&mut w, toolpath).unwrap();
        String::from_utf8(w.into_inner()).unwrap()
    }

    #[test]
    fn test_connected_motions_need_no_travel() {
        let mut tp = Toolpath::new(0.2);
        tp.start_path(1.0, 1.0, 0.2);
        tp.continue_path(5.0, 1.0, 0.2);
        tp.continue_path(5.0, 5.0, 0.2);
        let text = render(&tp);
        assert_eq!(text.lines().filter(|l| l.starts_with("G0 ")).count(), 1);
        assert_eq!(text.lines().filter(|l| l.starts_with("G1 X")).count(), 2);
    }

    #[test]
    fn test_rapid_retracts_around_travel() {
        let mut tp = Toolpath::new(0.2);
        tp.start_path(3.0, 4.0, 0.2);
        let text = render(&tp);
        let lines: Vec<_> = text.lines().collect();
        assert_eq!(lines[0], "; send generated toolpath");
        assert_eq!(lines[1], "G1 E-1.00000 F1800");
        assert!(lines[2].starts_with("G0 X3.000 Y4.000 Z0.200"));
        assert_eq!(lines[3], "G1 E0.00000 F1800");
    }

    #[test]
    fn test_extruder_change_sequence() {
        let mut tp = Toolpath::new(0.2);
        tp.change_extruder(1);
        let text = render(&tp);
        assert!(text.contains("; ---- Change to extruder 1"));
        assert!(text.contains("; Extruder 1 ready"));
        let tools: Vec<_> = text.lines().filter(|l| l.starts_with('T')).collect();
        assert_eq!(tools, vec!["T0", "T1"]);
        // wipe for tool 1 sits at x = 100
        assert!(text.contains("G0 X100.000 Y10.000"));
        assert!(text.contains("G1 X120.000 Y13.500"));
        assert_eq!(text.lines().filter(|l| l.starts_with("G1 X")).count(), 16);
    }

    #[test]
    fn test_layer_headers() {
        let mut mt = MachineToolpath::new();
        let layer = mt.create_layer(0.18);
        layer.start_path(1.0, 1.0, 0.18);
        layer.continue_path(2.0, 1.0, 0.18);
        let settings = GcodeSettings::default();
        let mut w = GcodeWriter::new(Vec::new(), &settings);
        write_machine_toolpath(&mut w, &mt).unwrap();
        let text = String::from_utf8(w.into_inner()).unwrap();
        assert!(text.contains(";\n; ==== layer at z=0.18\n;\nG92 E0\n; send generated toolpath\n"));
        assert!(text.trim_end().ends_with("M84 ; Disable motors"));
    }
}
