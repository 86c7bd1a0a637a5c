//! Octave/openEMS script rendering.
//!
//! A script is built line by line from a validated [`ParameterModel`]. Every
//! number is written with Rust's shortest round-trip `Display`, and nothing in
//! the output depends on the clock or the working directory, so the same input
//! always renders the same bytes.

use crate::config::{BoundaryPresets, EngineConfig};
use crate::core::{ParameterModel, Result, SimulationId, StructureType};

/// Files the script leaves in its working directory.
pub const FREQUENCY_FILE: &str = "frequency.txt";
pub const IMPEDANCE_REAL_FILE: &str = "impedance_real.txt";
pub const IMPEDANCE_IMAG_FILE: &str = "impedance_imag.txt";
pub const FIGURE_FILE: &str = "sparameters.png";
/// Subdirectory prefix for the raw openEMS field data of each excitation.
pub const OPENEMS_DATA_DIR: &str = "openems_data";

#[derive(Debug, Clone)]
pub struct ScriptGenerator {
    boundary_presets: BoundaryPresets,
    openems_matlab_path: Option<String>,
    csxcad_matlab_path: Option<String>,
}

impl Default for ScriptGenerator {
    fn default() -> Self {
        Self::from_config(&EngineConfig::default())
    }
}

impl ScriptGenerator {
    pub fn new(
        boundary_presets: BoundaryPresets,
        openems_matlab_path: Option<String>,
        csxcad_matlab_path: Option<String>,
    ) -> Self {
        Self {
            boundary_presets,
            openems_matlab_path,
            csxcad_matlab_path,
        }
    }

    pub fn from_config(config: &EngineConfig) -> Self {
        Self::new(
            config.boundary_presets.clone(),
            config.solver.openems_matlab_path.clone(),
            config.solver.csxcad_matlab_path.clone(),
        )
    }

    /// Render the full simulation script for `parameters`.
    pub fn generate(&self, parameters: &ParameterModel, simulation_name: &str) -> Result<String> {
        let id = SimulationId::new(simulation_name)?;
        parameters.validate().map_err(|e| e.for_simulation(&id))?;

        let mut script = Script::default();
        self.header(&mut script, parameters, &id);
        self.path_setup(&mut script);
        design_parameters(&mut script, parameters, &id);
        self.fdtd_setup(&mut script, parameters);
        mesh(&mut script, parameters.structure);
        dielectric_loss(&mut script);

        script.blank();
        script.line("%% Geometry, ports and solver run (one pass per excited port)");
        script.line("f = linspace(f_start, f_stop, f_points);");
        script.line("for excite_port = excite_ports");
        script.line("  CSX = InitCSX();");
        script.line("  CSX = DefineRectGrid(CSX, unit, mesh);");
        script.line("  CSX = AddMaterial(CSX, 'Substrate');");
        script.line(
            "  CSX = SetMaterialProperty(CSX, 'Substrate', 'Epsilon', substrate_epr, 'Kappa', substrate_kappa);",
        );
        script.line(conductor_property(parameters));
        geometry(&mut script, parameters.structure);
        run_and_post_process(&mut script);
        script.line("end");

        artifacts(&mut script, parameters.excitation.excite_both_ports);
        figure(&mut script);
        script.blank();
        script.line(format!("fprintf('simulation {} finished\\n');", id));

        Ok(script.finish())
    }

    fn header(&self, script: &mut Script, parameters: &ParameterModel, id: &SimulationId) {
        let title = match parameters.structure {
            StructureType::CoplanarWaveguide => "Coplanar waveguide",
            StructureType::Microstrip => "Microstrip line",
            StructureType::Waveguide => "Rectangular waveguide",
        };
        script.line(format!("%% {} simulation: {}", title, id));
        script.line("%% Generated by emsim-optimizer");
        script.blank();
        script.line("close all;");
        script.line("clear;");
    }

    fn path_setup(&self, script: &mut Script) {
        script.blank();
        script.line("%% openEMS / CSXCAD");
        for path in [&self.openems_matlab_path, &self.csxcad_matlab_path]
            .into_iter()
            .flatten()
        {
            script.line(format!("addpath('{}');", octave_quote(path)));
        }
        script.line("physical_constants;");
    }

    fn fdtd_setup(&self, script: &mut Script, parameters: &ParameterModel) {
        let boundaries = self
            .boundary_presets
            .get(parameters.structure)
            .iter()
            .map(|bc| format!("'{}'", bc.openems_name()))
            .collect::<Vec<_>>()
            .join(" ");

        script.blank();
        script.line("%% FDTD setup");
        script.line("FDTD = InitFDTD('EndCriteria', 1e-4);");
        script.line("FDTD = SetGaussExcite(FDTD, f_center, (f_stop - f_start) / 2);");
        script.line(format!("BC = {{{}}};", boundaries));
        script.line("FDTD = SetBoundaryCond(FDTD, BC);");
    }
}

#[derive(Default)]
struct Script {
    lines: Vec<String>,
}

impl Script {
    fn line(&mut self, line: impl Into<String>) {
        self.lines.push(line.into());
    }

    fn blank(&mut self) {
        self.lines.push(String::new());
    }

    fn assign(&mut self, name: &str, value: f64) {
        self.lines.push(format!("{} = {};", name, num(value)));
    }

    fn finish(self) -> String {
        let mut text = self.lines.join("\n");
        text.push('\n');
        text
    }
}

fn num(value: f64) -> String {
    format!("{}", value)
}

fn octave_quote(text: &str) -> String {
    text.replace('\'', "''")
}

fn design_parameters(script: &mut Script, p: &ParameterModel, id: &SimulationId) {
    let g = &p.geometry;
    script.blank();
    script.line(format!("%% Design parameters (lengths in {})", p.unit.symbol()));
    script.assign("unit", p.unit.meters());
    script.assign("line_length", g.length);
    script.assign("port_length", p.excitation.port_length);
    script.assign("line_width", g.width);
    script.assign("line_gap", g.gap);
    script.assign("substrate_height", g.substrate_height);
    script.assign("substrate_width", g.substrate_width);
    script.assign("metal_thickness", g.metal_thickness);
    script.assign("air_spacing", g.air_spacing);
    script.assign("substrate_epr", p.material.relative_permittivity);
    script.assign("substrate_tand", p.material.loss_tangent);
    script.assign("metal_kappa", p.material.conductivity);
    script.assign("ref_impedance", p.excitation.reference_impedance);

    script.blank();
    script.line("%% Frequency sweep (Hz)");
    script.assign("f_start", p.sweep.start);
    script.assign("f_stop", p.sweep.stop);
    script.line(format!("f_points = {};", p.sweep.points));
    script.line("f_center = (f_start + f_stop) / 2;");

    script.blank();
    script.line("%% Mesh");
    script.assign("resolution", p.mesh.resolution);
    script.assign("edge_res", p.mesh.edge_resolution);
    let pml = p
        .mesh
        .pml_cells
        .iter()
        .map(|c| c.to_string())
        .collect::<Vec<_>>()
        .join(" ");
    script.line(format!("pml_cells = [{}];", pml));

    script.blank();
    let ports = if p.excitation.excite_both_ports { "[1 2]" } else { "[1]" };
    script.line(format!("excite_ports = {};", ports));
    script.line(format!("Sim_Path = '{}';", OPENEMS_DATA_DIR));
    script.line(format!("Sim_CSX = '{}.xml';", id));
}

fn mesh(script: &mut Script, structure: StructureType) {
    script.blank();
    match structure {
        StructureType::CoplanarWaveguide => {
            script.line("mesh.x = SmoothMeshLines([0 line_length/2 line_length/2+air_spacing], resolution, 1.5, 0);");
            script.line("mesh.x = unique(sort([-mesh.x mesh.x]));");
            // Third-rule lines around both edges of each slot.
            script.line("mesh.y = SmoothMeshLines([line_width/2+[-edge_res/3 +edge_res/3*2] line_gap+line_width/2+[-edge_res/3*2 +edge_res/3]], edge_res, 1.5, 0);");
            script.line("mesh.y = SmoothMeshLines([0 mesh.y], edge_res*2, 1.3, 0);");
            script.line("mesh.y = SmoothMeshLines([0 mesh.y substrate_width/2 substrate_width/2+air_spacing], resolution, 1.3, 0);");
            script.line("mesh.y = unique(sort([-mesh.y mesh.y]));");
            script.line("mesh.z = SmoothMeshLines([-air_spacing linspace(0, substrate_height, 5) substrate_height+air_spacing], resolution);");
        }
        StructureType::Microstrip => {
            script.line("mesh.x = SmoothMeshLines([0 line_length/2 line_length/2+air_spacing], resolution, 1.5, 0);");
            script.line("mesh.x = unique(sort([-mesh.x mesh.x]));");
            script.line("mesh.y = SmoothMeshLines(line_width/2+[-edge_res/3 +edge_res/3*2], edge_res, 1.5, 0);");
            script.line("mesh.y = SmoothMeshLines([0 mesh.y substrate_width/2 substrate_width/2+air_spacing], resolution, 1.3, 0);");
            script.line("mesh.y = unique(sort([-mesh.y mesh.y]));");
            script.line("mesh.z = SmoothMeshLines([linspace(0, substrate_height, 5) substrate_height+air_spacing], resolution);");
        }
        StructureType::Waveguide => {
            script.line("mesh.x = SmoothMeshLines([-line_length/2 line_length/2], resolution);");
            script.line("mesh.y = SmoothMeshLines([-line_width/2 line_width/2], resolution);");
            script.line("mesh.z = SmoothMeshLines([-line_gap/2 line_gap/2], resolution);");
        }
    }
    script.line("mesh = AddPML(mesh, pml_cells);");
}

fn dielectric_loss(script: &mut Script) {
    script.blank();
    script.line("%% Dielectric loss as an equivalent conductivity at the band centre");
    script.line("substrate_kappa = substrate_tand * 2*pi*f_center * EPS0 * substrate_epr;");
}

fn conductor_property(p: &ParameterModel) -> String {
    if p.material.conductivity == 0.0 {
        "  CSX = AddMetal(CSX, 'Conductor');".to_string()
    } else {
        "  CSX = AddConductingSheet(CSX, 'Conductor', metal_kappa, metal_thickness*unit);".to_string()
    }
}

fn geometry(script: &mut Script, structure: StructureType) {
    match structure {
        StructureType::CoplanarWaveguide => {
            script.line("  CSX = AddBox(CSX, 'Substrate', 0, [-line_length/2, -substrate_width/2, 0], [line_length/2, substrate_width/2, substrate_height]);");
            for (port, start, stop) in [
                ("1", "-line_length/2", "-line_length/2+port_length"),
                ("2", "line_length/2", "line_length/2-port_length"),
            ] {
                script.line(format!("  portstart = [{}, -line_width/2, substrate_height];", start));
                script.line(format!("  portstop = [{}, line_width/2, substrate_height];", stop));
                script.line(format!(
                    "  [CSX, port{{{port}}}] = AddCPWPort(CSX, 999, {port}, 'Conductor', portstart, portstop, line_gap, 'x', [0 1 0], 'ExcitePort', excite_port == {port}, 'MeasPlaneShift', port_length, 'Feed_R', ref_impedance);",
                ));
            }
            script.line("  CSX = AddBox(CSX, 'Conductor', 999, [-line_length/2+port_length, -line_width/2, substrate_height], [line_length/2-port_length, line_width/2, substrate_height]);");
            script.line("  CSX = AddBox(CSX, 'Conductor', 999, [-line_length/2, -line_width/2-line_gap, substrate_height], [line_length/2, -substrate_width/2, substrate_height]);");
            script.line("  CSX = AddBox(CSX, 'Conductor', 999, [-line_length/2, line_width/2+line_gap, substrate_height], [line_length/2, substrate_width/2, substrate_height]);");
        }
        StructureType::Microstrip => {
            script.line("  CSX = AddBox(CSX, 'Substrate', 0, [-line_length/2, -substrate_width/2, 0], [line_length/2, substrate_width/2, substrate_height]);");
            for (port, start, stop) in [
                ("1", "-line_length/2", "-line_length/2+port_length"),
                ("2", "line_length/2", "line_length/2-port_length"),
            ] {
                script.line(format!("  portstart = [{}, -line_width/2, substrate_height];", start));
                script.line(format!("  portstop = [{}, line_width/2, 0];", stop));
                script.line(format!(
                    "  [CSX, port{{{port}}}] = AddMSLPort(CSX, 999, {port}, 'Conductor', portstart, portstop, 'x', [0 0 -1], 'ExcitePort', excite_port == {port}, 'MeasPlaneShift', port_length, 'Feed_R', ref_impedance);",
                ));
            }
            script.line("  CSX = AddBox(CSX, 'Conductor', 999, [-line_length/2+port_length, -line_width/2, substrate_height], [line_length/2-port_length, line_width/2, substrate_height]);");
            script.line("  CSX = AddBox(CSX, 'Conductor', 999, [-line_length/2, -substrate_width/2, 0], [line_length/2, substrate_width/2, 0]);");
        }
        StructureType::Waveguide => {
            script.line("  CSX = AddBox(CSX, 'Substrate', 0, [-line_length/2, -line_width/2, -line_gap/2], [line_length/2, line_width/2, line_gap/2]);");
            for (port, start, stop) in [
                ("1", "-line_length/2", "-line_length/2+port_length"),
                ("2", "line_length/2", "line_length/2-port_length"),
            ] {
                script.line(format!("  portstart = [{}, -line_width/2, -line_gap/2];", start));
                script.line(format!("  portstop = [{}, line_width/2, line_gap/2];", stop));
                script.line(format!(
                    "  [CSX, port{{{port}}}] = AddRectWaveGuidePort(CSX, 0, {port}, portstart, portstop, 'x', line_width*unit, line_gap*unit, 'TE10', excite_port == {port});",
                ));
            }
        }
    }
}

fn run_and_post_process(script: &mut Script) {
    script.line("  run_path = sprintf('%s_%d', Sim_Path, excite_port);");
    script.line("  confirm_recursive_rmdir(0);");
    script.line("  [status, message] = rmdir(run_path, 's');");
    script.line("  [status, message] = mkdir(run_path);");
    script.line("  WriteOpenEMS([run_path '/' Sim_CSX], FDTD, CSX);");
    script.line("  RunOpenEMS(run_path, Sim_CSX);");
    script.line("  port = calcPort(port, run_path, f, 'RefImpedance', ref_impedance);");
    script.line("  if excite_port == 1");
    script.line("    s11 = port{1}.uf.ref ./ port{1}.uf.inc;");
    script.line("    s21 = port{2}.uf.ref ./ port{1}.uf.inc;");
    script.line("    Zc = port{1}.ZL;");
    script.line("  else");
    script.line("    s12 = port{1}.uf.ref ./ port{2}.uf.inc;");
    script.line("    s22 = port{2}.uf.ref ./ port{2}.uf.inc;");
    script.line("  end");
}

fn artifacts(script: &mut Script, both_ports: bool) {
    script.blank();
    script.line("%% Result files");
    script.line("write_column = @(name, v) dlmwrite(name, v(:), 'precision', '%.12e');");
    script.line(format!("write_column('{}', f);", FREQUENCY_FILE));
    let measured: &[&str] = if both_ports {
        &["s11", "s21", "s12", "s22"]
    } else {
        &["s11", "s21"]
    };
    for s in measured {
        script.line(format!("write_column('{s}_real.txt', real({s}));"));
        script.line(format!("write_column('{s}_imag.txt', imag({s}));"));
    }
    script.line(format!("write_column('{}', real(Zc));", IMPEDANCE_REAL_FILE));
    script.line(format!("write_column('{}', imag(Zc));", IMPEDANCE_IMAG_FILE));
}

fn figure(script: &mut Script) {
    script.blank();
    script.line("h = figure('visible', 'off');");
    script.line("plot(f/1e9, 20*log10(abs(s11)), 'b-', f/1e9, 20*log10(abs(s21)), 'r-');");
    script.line("grid on;");
    script.line("xlabel('Frequency (GHz)');");
    script.line("ylabel('|S| (dB)');");
    script.line("legend('S11', 'S21');");
    script.line(format!("print(h, '-dpng', '{}');", FIGURE_FILE));
    script.line("close(h);");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{BoundaryCondition, EngineError};

    #[test]
    fn generation_is_deterministic() {
        let generator = ScriptGenerator::default();
        let params = ParameterModel::cpw(10.0, 6.0);
        let a = generator.generate(&params, "cpw_50").unwrap();
        let b = generator.generate(&params, "cpw_50").unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn design_values_are_rendered_verbatim() {
        let script = ScriptGenerator::default()
            .generate(&ParameterModel::cpw(12.5, 6.0), "cpw_a")
            .unwrap();
        assert!(script.contains("line_width = 12.5;"));
        assert!(script.contains("line_gap = 6;"));
        assert!(script.contains("f_start = 1000000000;"));
        assert!(script.contains("f_points = 201;"));
        assert!(script.contains("unit = 0.000001;"));
        assert!(script.contains("Sim_CSX = 'cpw_a.xml';"));
        assert!(script.contains("AddCPWPort"));
    }

    #[test]
    fn boundary_preset_follows_structure() {
        let generator = ScriptGenerator::default();
        let cpw = generator.generate(&ParameterModel::default(), "a").unwrap();
        assert!(cpw.contains("BC = {'MUR' 'MUR' 'MUR' 'MUR' 'MUR' 'MUR'};"));

        let mut msl = ParameterModel::default();
        msl.structure = StructureType::Microstrip;
        let msl = generator.generate(&msl, "b").unwrap();
        assert!(msl.contains("BC = {'PML_8' 'PML_8' 'MUR' 'MUR' 'PEC' 'MUR'};"));
        assert!(msl.contains("AddMSLPort"));
    }

    #[test]
    fn custom_presets_are_used() {
        let mut presets = BoundaryPresets::default();
        presets.coplanar_waveguide = [BoundaryCondition::Pec; 6];
        let script = ScriptGenerator::new(presets, None, None)
            .generate(&ParameterModel::default(), "a")
            .unwrap();
        assert!(script.contains("BC = {'PEC' 'PEC' 'PEC' 'PEC' 'PEC' 'PEC'};"));
        assert!(!script.contains("addpath"));
    }

    #[test]
    fn conductor_kind_follows_conductivity() {
        let generator = ScriptGenerator::default();
        let mut params = ParameterModel::default();
        let pec = generator.generate(&params, "a").unwrap();
        assert!(pec.contains("AddMetal(CSX, 'Conductor')"));
        assert!(!pec.contains("AddConductingSheet"));

        params.material.conductivity = 5.8e7;
        let sheet = generator.generate(&params, "a").unwrap();
        assert!(sheet.contains("AddConductingSheet(CSX, 'Conductor', metal_kappa, metal_thickness*unit)"));
        assert!(sheet.contains("metal_kappa = 58000000;"));
    }

    #[test]
    fn both_ports_adds_reverse_parameters() {
        let generator = ScriptGenerator::default();
        let mut params = ParameterModel::default();
        let one = generator.generate(&params, "a").unwrap();
        assert!(one.contains("excite_ports = [1];"));
        assert!(!one.contains("s22_real.txt"));

        params.excitation.excite_both_ports = true;
        let two = generator.generate(&params, "a").unwrap();
        assert!(two.contains("excite_ports = [1 2];"));
        assert!(two.contains("write_column('s22_real.txt', real(s22));"));
    }

    #[test]
    fn waveguide_uses_rectangular_ports() {
        let mut params = ParameterModel::from_defaults(
            StructureType::Waveguide,
            &crate::core::StructureDefaults::for_structure(StructureType::Waveguide),
            crate::core::FrequencySweep::new(18e9, 26e9, 101),
        );
        params.unit = crate::core::LengthUnit::Micrometer;
        let script = ScriptGenerator::default().generate(&params, "wr42").unwrap();
        assert!(script.contains("AddRectWaveGuidePort"));
        assert!(script.contains("'PEC' 'PEC' 'PEC' 'PEC'"));
    }

    #[test]
    fn invalid_width_is_rejected_with_field_name() {
        let err = ScriptGenerator::default()
            .generate(&ParameterModel::cpw(0.0, 6.0), "bad")
            .unwrap_err();
        match err {
            EngineError::InvalidParameter { field, simulation, .. } => {
                assert_eq!(field, "geometry.width");
                assert_eq!(simulation.unwrap().as_str(), "bad");
            }
            other => panic!("unexpected error {other}"),
        }
    }

    #[test]
    fn unsafe_names_are_rejected() {
        assert!(ScriptGenerator::default()
            .generate(&ParameterModel::default(), "../x")
            .is_err());
    }
}
