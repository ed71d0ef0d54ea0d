use std::fmt::{Display, Formatter, Result as FmtResult};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Instant;

use image::RgbImage;
use log::{info, LevelFilter};
use serde::Serialize;
use simplelog::{
    ColorChoice, CombinedLogger, Config, TermLogger, TerminalMode, WriteLogger,
};
use structopt::StructOpt;

use base::defs::{Error, ErrorKind::*, IntoResult, Result};
use base::util::cli::Array as CliArray;
use base::util::fs;

use crate::camera::{Camera, Intrinsics};
use crate::color_projection::project_colors;
use crate::mesh::Mesh;
use crate::misc::{load_rgb_image, log_elapsed, save_rgb_image, Matrix4};
use crate::optimize::{
    level_schedule, LevelReport, LevelSchedule, OptimizeParams, Optimizer,
};
use crate::oracle::{ExternalOracle, PatchOracle, MAX_IMAGE_SIZE};
use crate::patch_match::PatchMatch;
use crate::point_cloud::estimate_normals;
use crate::trajectory::{read_pose_file, read_trajectory, to_world_to_camera};
use crate::view::{ViewId, ViewIndex, ViewMap};

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OracleKind {
    Builtin,
    External,
}

impl FromStr for OracleKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "builtin" => Ok(Self::Builtin),
            "external" => Ok(Self::External),
            _ => {
                let desc = format!("unknown patch matcher '{}'", s);
                Err(Error::new(InvalidConfig, desc))
            }
        }
    }
}

impl Display for OracleKind {
    fn fmt(&self, f: &mut Formatter) -> FmtResult {
        match self {
            Self::Builtin => write!(f, "builtin"),
            Self::External => write!(f, "external"),
        }
    }
}

#[derive(Clone, Debug, Serialize, StructOpt)]
pub struct OracleParams {
    #[structopt(
        help = "Patch matcher: builtin or external",
        long,
        default_value = "builtin"
    )]
    pub oracle: OracleKind,

    #[structopt(
        help = "Iterations of the built-in patch matcher",
        long,
        default_value = "5"
    )]
    pub patch_match_iterations: usize,

    #[structopt(
        help = "Random seed of the built-in patch matcher",
        long,
        default_value = "0"
    )]
    pub seed: u64,

    #[structopt(help = "External patch matching executable", long)]
    pub patch_match_bin: Option<PathBuf>,
}

impl OracleParams {
    pub fn validate(&self) -> Result<()> {
        if self.oracle == OracleKind::External && self.patch_match_bin.is_none() {
            let desc = "external patch matcher requires --patch-match-bin";
            return Err(Error::new(InvalidConfig, desc));
        }
        Ok(())
    }

    pub fn build<P: AsRef<Path>>(&self, work_dir: P) -> Result<Box<dyn PatchOracle>> {
        self.validate()?;
        match (&self.oracle, &self.patch_match_bin) {
            (OracleKind::External, Some(binary)) => {
                Ok(Box::new(ExternalOracle::new(binary, work_dir)?))
            }
            _ => Ok(Box::new(PatchMatch {
                iterations: self.patch_match_iterations,
                seed: self.seed,
            })),
        }
    }
}

#[derive(Debug, StructOpt)]
#[structopt(about = "Align view textures over a mesh")]
pub struct AlignCommand {
    #[structopt(help = "Directory with source images")]
    pub input_dir: PathBuf,

    #[structopt(help = "Mesh file (.ply or .obj)")]
    pub mesh_path: PathBuf,

    #[structopt(help = "Camera intrinsics as fx,fy,cx,cy", long, short = "k")]
    pub intrinsics: CliArray<f64, 4>,

    #[structopt(help = "Source image extension", long, default_value = "jpg")]
    pub image_extension: String,

    #[structopt(help = "Trajectory file with the poses of all images", long)]
    pub trajectory: Option<PathBuf>,

    #[structopt(
        help = "Directory with per-image pose files (input directory if omitted)",
        long
    )]
    pub pose_dir: Option<PathBuf>,

    #[structopt(help = "Poses are camera to world transforms", long)]
    pub camera_to_world: bool,

    #[structopt(
        help = "View to align (all if omitted)",
        long = "view",
        number_of_values = 1
    )]
    pub views: Vec<usize>,

    #[structopt(
        help = "Number of neighbors for normal estimation",
        long,
        default_value = "20"
    )]
    pub normal_neighbors: usize,

    #[structopt(
        help = "Output directory",
        long,
        short = "o",
        default_value = "texalign_output"
    )]
    pub output_dir: PathBuf,

    #[structopt(help = "Log debug messages", long, short = "v")]
    pub verbose: bool,

    #[structopt(flatten)]
    pub optimize: OptimizeParams,

    #[structopt(flatten)]
    pub oracle: OracleParams,
}

#[derive(Serialize)]
struct Settings<'a> {
    input_dir: &'a Path,
    mesh_path: &'a Path,
    image_size: (u32, u32),
    intrinsics: Intrinsics,
    views: &'a [ViewId],
    camera_to_world: bool,
    optimize: &'a OptimizeParams,
    oracle: &'a OracleParams,
    levels: &'a [LevelSchedule],
}

pub fn init_logging<P: AsRef<Path>>(output_dir: P, verbose: bool) -> Result<()> {
    let level = if verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };
    let log_file = fs::create_file(output_dir.as_ref().join("texalign.log"))?;
    CombinedLogger::init(vec![
        TermLogger::new(
            level,
            Config::default(),
            TerminalMode::Mixed,
            ColorChoice::Auto,
        ),
        WriteLogger::new(level, Config::default(), log_file),
    ])
    .map_err(|e| {
        Error::with_source(InconsistentState, "failed to initialize logging", e)
    })
}

fn check_image_sizes(images: &ViewMap<RgbImage>) -> Result<(u32, u32)> {
    let mut size = None;
    for (id, image) in images {
        let dims = image.dimensions();
        if dims.0 > MAX_IMAGE_SIZE || dims.1 > MAX_IMAGE_SIZE {
            let desc = format!(
                "image {} of size {}x{} exceeds {} pixels",
                id, dims.0, dims.1, MAX_IMAGE_SIZE
            );
            return Err(Error::new(InvalidConfig, desc));
        }
        match size {
            None => size = Some(dims),
            Some(first) if first != dims => {
                let desc = format!(
                    "image {} is {}x{} while others are {}x{}",
                    id, dims.0, dims.1, first.0, first.1
                );
                return Err(Error::new(InvalidConfig, desc));
            }
            _ => (),
        }
    }
    size.res(|| "no images to align".to_string())
}

fn save_level(levels_dir: &Path, report: &LevelReport) -> Result<()> {
    let (width, height) = report.schedule.size;
    let dir = levels_dir.join(format!("{}x{}", width, height));
    fs::create_dir(&dir)?;
    for (id, target) in report.targets {
        save_rgb_image(target, dir.join(format!("target_{}.png", id)))?;
    }
    for (id, texture) in report.textures {
        save_rgb_image(texture, dir.join(format!("texture_{}.png", id)))?;
    }
    info!("  level images saved to '{}'", dir.display());
    Ok(())
}

fn write_json<T: Serialize, P: AsRef<Path>>(value: &T, path: P) -> Result<()> {
    let path = path.as_ref();
    let json = serde_json::to_string_pretty(value)
        .res(|| format!("failed to serialize '{}'", path.display()))?;
    fs::write_file(path, json)
}

impl AlignCommand {
    pub fn run(&self) -> Result<()> {
        fs::create_dir(&self.output_dir)?;
        init_logging(&self.output_dir, self.verbose)?;
        self.align()
    }

    fn load_poses(&self, image_paths: &[PathBuf]) -> Result<Vec<Matrix4>> {
        let poses = match &self.trajectory {
            Some(path) => read_trajectory(path)?,
            None => {
                let dir = self.pose_dir.as_ref().unwrap_or(&self.input_dir);
                image_paths
                    .iter()
                    .map(|image_path| {
                        let pose_path = image_path.with_extension("txt");
                        let name = pose_path.file_name().res(|| {
                            format!("bad image path '{}'", image_path.display())
                        })?;
                        read_pose_file(dir.join(name))
                    })
                    .collect::<Result<Vec<_>>>()?
            }
        };

        if poses.len() < image_paths.len() {
            let desc = format!(
                "{} poses given for {} images",
                poses.len(),
                image_paths.len()
            );
            return Err(Error::new(InvalidConfig, desc));
        }
        to_world_to_camera(poses, self.camera_to_world)
    }

    fn load_mesh(&self) -> Result<Mesh> {
        let mut mesh = Mesh::load(&self.mesh_path)?;
        if !mesh.has_normals() {
            info!("  estimating normals from {} neighbors...", self.normal_neighbors);
            mesh.normals = estimate_normals(&mesh.vertices, self.normal_neighbors)?;
        }
        info!(
            "  mesh has {} vertices and {} faces",
            mesh.vertices.len(),
            mesh.faces.len()
        );
        Ok(mesh)
    }

    /// Loads inputs, runs the optimization and writes every output.
    pub fn align(&self) -> Result<()> {
        let start = Instant::now();
        fs::create_dir(&self.output_dir)?;

        info!("loading inputs...");
        let image_paths = fs::list_files(&self.input_dir, &self.image_extension)?;
        if image_paths.is_empty() {
            let desc = format!(
                "no .{} images in '{}'",
                self.image_extension,
                self.input_dir.display()
            );
            return Err(Error::new(InvalidConfig, desc));
        }
        let poses = self.load_poses(&image_paths)?;
        let views = ViewIndex::new(&self.views, image_paths.len())?;
        let sources = views.try_map(|id| load_rgb_image(&image_paths[id.index()]))?;
        let image_size = check_image_sizes(&sources)?;
        let schedule = level_schedule(&self.optimize, image_size)?;
        self.oracle.validate()?;
        info!(
            "  {} of {} images selected, {}x{} pixels",
            views.len(),
            image_paths.len(),
            image_size.0,
            image_size.1
        );

        let intrinsics = Intrinsics::from_array(self.intrinsics.0);
        let cameras = views.map(|id| Camera::new(poses[id.index()], intrinsics));
        let mesh = self.load_mesh()?;

        write_json(
            &Settings {
                input_dir: &self.input_dir,
                mesh_path: &self.mesh_path,
                image_size,
                intrinsics,
                views: views.ids(),
                camera_to_world: self.camera_to_world,
                optimize: &self.optimize,
                oracle: &self.oracle,
                levels: &schedule,
            },
            self.output_dir.join("settings.json"),
        )?;

        info!("optimizing...");
        let oracle = self.oracle.build(self.output_dir.join("oracle"))?;
        let optimizer = Optimizer {
            params: &self.optimize,
            mesh: &mesh,
            views: &views,
            cameras: &cameras,
            sources: &sources,
            oracle: oracle.as_ref(),
        };
        let levels_dir = self.output_dir.join("levels");
        let result = optimizer.run(|report| save_level(&levels_dir, report))?;

        info!("saving results...");
        let targets_dir = self.output_dir.join("targets");
        let textures_dir = self.output_dir.join("textures");
        fs::create_dir(&targets_dir)?;
        fs::create_dir(&textures_dir)?;
        for &id in views.ids() {
            let stem = image_paths[id.index()]
                .file_stem()
                .res(|| format!("no file name for view {}", id))?;
            let name = Path::new(stem).with_extension("png");
            save_rgb_image(&result.targets[&id], targets_dir.join(&name))?;
            save_rgb_image(&result.textures[&id], textures_dir.join(&name))?;
        }

        for (name, images) in [
            ("result_S.ply", &sources),
            ("result_T.ply", &result.targets),
            ("result_M.ply", &result.textures),
        ] {
            let colors = project_colors(&mesh, &views, &result.geometry, images);
            mesh.save_ply(self.output_dir.join(name), &colors)?;
        }

        write_json(&result.energies, self.output_dir.join("energies.json"))?;
        log_elapsed(start, "alignment");
        Ok(())
    }
}
