//! Octave/Matlab dump of the footstep sequence for offline inspection.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use crate::footstep::StepKind;
use crate::WalkingPatternGenerator;

impl WalkingPatternGenerator {
    /// Write a script that plots every footstep's reference point and
    /// constraint rectangle. Double supports are skipped unless `plot_ds`.
    pub fn fs_to_file(&self, path: impl AsRef<Path>, plot_ds: bool) -> std::io::Result<()> {
        let mut out = BufWriter::new(File::create(path)?);

        writeln!(out, "% walking pattern footsteps")?;
        writeln!(out, "cla;")?;
        writeln!(out, "clear FS;\n")?;

        let mut idx = 0;
        for fs in &self.steps {
            if !plot_ds && fs.kind == StepKind::Double {
                continue;
            }
            idx += 1;
            writeln!(out, "FS({idx}).a = {:.6};", fs.pose.angle)?;
            writeln!(out, "FS({idx}).p = [{:.6};{:.6}];", fs.pose.x, fs.pose.y)?;
            writeln!(
                out,
                "FS({idx}).d = [{:.6};{:.6};{:.6};{:.6}];",
                fs.bounds[0], fs.bounds[1], fs.bounds[2], fs.bounds[3]
            )?;

            // closed constraint rectangle in world coordinates
            let [toe, outer, heel, inner] = fs.bounds;
            let corners = [
                (toe, outer),
                (-heel, outer),
                (-heel, -inner),
                (toe, -inner),
                (toe, outer),
            ];
            write!(out, "FS({idx}).v = [")?;
            for (px, py) in corners {
                let (x, y) = fs.pose.transform(px, py);
                write!(out, "{x:.6} {y:.6}; ")?;
            }
            writeln!(out, "];")?;

            let tag = if fs.kind == StepKind::Double { 1 } else { 2 };
            writeln!(out, "FS({idx}).type = {tag};\n")?;
        }

        writeln!(out, "hold on")?;
        writeln!(out, "for i=1:length(FS)")?;
        writeln!(out, "    if FS(i).type == 1;")?;
        writeln!(
            out,
            "        plot (FS(i).p(1),FS(i).p(2),'gs','MarkerFaceColor','r','MarkerSize',2)"
        )?;
        writeln!(out, "        plot (FS(i).v(:,1), FS(i).v(:,2), 'c');")?;
        writeln!(out, "    end")?;
        writeln!(out, "    if FS(i).type == 2;")?;
        writeln!(
            out,
            "        plot (FS(i).p(1),FS(i).p(2),'gs','MarkerFaceColor','g','MarkerSize',4)"
        )?;
        writeln!(out, "        plot (FS(i).v(:,1), FS(i).v(:,2), 'r');")?;
        writeln!(out, "    end")?;
        writeln!(out, "end")?;
        writeln!(out, "grid on; %axis equal")?;
        out.flush()
    }
}

#[cfg(test)]
mod tests {
    use crate::{StepPlacement, WalkingPatternGenerator};

    #[test]
    fn dump_writes_every_single_support() {
        let mut wpg = WalkingPatternGenerator::new(15, 100, 0.02);
        wpg.add_footstep_timed(0.0, 0.05, 0.0, 4, 4, StepPlacement::Left);
        wpg.add_footstep_timed(0.035, -0.1, 0.0, 2, 4, StepPlacement::Auto);
        wpg.add_footstep_timed(0.035, 0.1, 0.0, 2, 4, StepPlacement::Auto);

        let path = std::env::temp_dir().join("pacer_wpg_dump_test.m");
        wpg.fs_to_file(&path, false).unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        std::fs::remove_file(&path).ok();

        // 3 single supports, double supports skipped
        assert!(text.contains("FS(3).type = 2;"));
        assert!(!text.contains("FS(4)"));
        assert!(!text.contains(".type = 1;"));
        assert!(text.contains("grid on"));
    }
}
