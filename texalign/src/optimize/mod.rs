mod blend;
mod pyramid;
mod votes;

use std::fmt::{Display, Formatter, Result as FmtResult};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Instant;

use image::RgbImage;
use log::{debug, info, warn};
use serde::Serialize;
use structopt::StructOpt;

use base::defs::{Error, ErrorKind::*, IntoResult, Result};

use crate::camera::{Camera, PixelScale};
use crate::geometry::{scale_cameras, ViewGeometry};
use crate::mesh::Mesh;
use crate::misc::{log_elapsed, resize_image};
use crate::oracle::{PatchField, PatchOracle};
pub use crate::optimize::{blend::*, pyramid::*, votes::*};
use crate::view::{ViewId, ViewIndex, ViewMap};

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum GeometryResolution {
    /// Geometry rebuilt for every pyramid level.
    Level,
    /// Geometry built once at the source resolution.
    Origin,
}

impl FromStr for GeometryResolution {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "level" => Ok(Self::Level),
            "origin" => Ok(Self::Origin),
            _ => {
                let desc = format!("unknown geometry resolution '{}'", s);
                Err(Error::new(InvalidConfig, desc))
            }
        }
    }
}

impl Display for GeometryResolution {
    fn fmt(&self, f: &mut Formatter) -> FmtResult {
        match self {
            Self::Level => write!(f, "level"),
            Self::Origin => write!(f, "origin"),
        }
    }
}

#[derive(Clone, Debug, Serialize, StructOpt)]
pub struct OptimizeParams {
    #[structopt(help = "Number of pyramid levels", long, default_value = "3")]
    pub levels: usize,

    #[structopt(
        help = "Resolution ratio of neighboring pyramid levels",
        long,
        default_value = "2"
    )]
    pub scale_factor: f64,

    #[structopt(
        help = "Number of iterations at the coarsest level",
        long,
        default_value = "50"
    )]
    pub initial_iterations: usize,

    #[structopt(
        help = "Iterations dropped at every finer level",
        long,
        default_value = "5"
    )]
    pub iteration_decrement: usize,

    #[structopt(
        help = "Patch width in pixels",
        long,
        short = "w",
        default_value = "7"
    )]
    pub patch_width: u32,

    #[structopt(
        help = "Weight of source patches found in the target",
        long,
        default_value = "1"
    )]
    pub alpha_u: f64,

    #[structopt(
        help = "Weight of target patches found in the source",
        long,
        default_value = "2"
    )]
    pub alpha_v: f64,

    #[structopt(
        help = "Weight of multi-view consistency",
        long,
        default_value = "0.1"
    )]
    pub lambda: f64,

    #[structopt(
        help = "Resolution of geometry buffers: level or origin",
        long,
        default_value = "level"
    )]
    pub geometry_resolution: GeometryResolution,
}

impl OptimizeParams {
    pub fn validate(&self) -> Result<()> {
        if self.levels == 0 {
            return Err(Error::new(InvalidConfig, "at least one level is required"));
        }
        if !self.scale_factor.is_finite() || self.scale_factor < 1.0 {
            let desc = format!("scale factor {} is below 1", self.scale_factor);
            return Err(Error::new(InvalidConfig, desc));
        }
        if self.patch_width == 0 {
            return Err(Error::new(InvalidConfig, "patch width must be positive"));
        }
        for (name, value) in [
            ("alpha-u", self.alpha_u),
            ("alpha-v", self.alpha_v),
            ("lambda", self.lambda),
        ] {
            if !value.is_finite() || value < 0.0 {
                let desc = format!("{} must be non-negative, got {}", name, value);
                return Err(Error::new(InvalidConfig, desc));
            }
        }
        Ok(())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct EnergyRecord {
    pub level: usize,
    pub width: u32,
    pub height: u32,
    pub iteration: usize,
    pub similarity: f64,
    pub consistency: f64,
}

/// Images of a finished level.
pub struct LevelReport<'a> {
    pub schedule: &'a LevelSchedule,
    pub targets: &'a ViewMap<RgbImage>,
    pub textures: &'a ViewMap<RgbImage>,
}

pub struct OptimizationResult {
    pub targets: ViewMap<RgbImage>,
    pub textures: ViewMap<RgbImage>,
    /// Geometry of the source resolution.
    pub geometry: Arc<ViewGeometry>,
    pub energies: Vec<EnergyRecord>,
}

enum LevelState {
    LevelInit(usize),
    Iterate { level: usize, iteration: usize },
    LevelDone(usize),
    Finished,
}

struct Level {
    schedule: LevelSchedule,
    geometry: Arc<ViewGeometry>,
    scale: PixelScale,
    sources: ViewMap<RgbImage>,
    targets: ViewMap<RgbImage>,
    textures: ViewMap<RgbImage>,
}

pub struct Optimizer<'a> {
    pub params: &'a OptimizeParams,
    pub mesh: &'a Mesh,
    pub views: &'a ViewIndex,
    /// Cameras of the source resolution.
    pub cameras: &'a ViewMap<Camera>,
    pub sources: &'a ViewMap<RgbImage>,
    pub oracle: &'a dyn PatchOracle,
}

impl<'a> Optimizer<'a> {
    fn origin_size(&self) -> Result<(u32, u32)> {
        let mut sizes = self.views.ids().iter().map(|id| {
            self.sources
                .get(id)
                .map(|image| image.dimensions())
                .res(|| format!("no source image for view {}", id))
        });
        let size = sizes
            .next()
            .res(|| "no views to optimize".to_string())??;
        for other in sizes {
            let other = other?;
            if other != size {
                let desc = format!(
                    "source images differ in size: {}x{} and {}x{}",
                    size.0, size.1, other.0, other.1
                );
                return Err(Error::new(InconsistentState, desc));
            }
        }
        Ok(size)
    }

    /// Runs the pyramid to the end, reporting every finished level.
    pub fn run<F>(&self, mut on_level_done: F) -> Result<OptimizationResult>
    where
        F: FnMut(&LevelReport) -> Result<()>,
    {
        let origin_size = self.origin_size()?;
        let schedule = level_schedule(self.params, origin_size)?;

        let origin_geometry = match self.params.geometry_resolution {
            GeometryResolution::Origin => Some(Arc::new(ViewGeometry::build(
                self.mesh,
                self.views,
                self.cameras,
                origin_size,
            ))),
            GeometryResolution::Level => None,
        };

        let mut energies = Vec::new();
        let mut current: Option<Level> = None;
        let mut state = LevelState::LevelInit(0);

        loop {
            state = match state {
                LevelState::LevelInit(index) => {
                    let level = self.init_level(
                        &schedule[index],
                        origin_size,
                        current.take(),
                        origin_geometry.as_ref(),
                    );
                    current = Some(level);
                    LevelState::Iterate {
                        level: index,
                        iteration: 0,
                    }
                }
                LevelState::Iterate { level: index, iteration } => {
                    let level = current
                        .as_mut()
                        .res(|| format!("level {} is not initialized", index))?;
                    if iteration < level.schedule.iterations {
                        let (targets, textures, energy) = self.iterate(level, iteration);
                        level.targets = targets;
                        level.textures = textures;
                        energies.push(energy);
                        LevelState::Iterate {
                            level: index,
                            iteration: iteration + 1,
                        }
                    } else {
                        LevelState::LevelDone(index)
                    }
                }
                LevelState::LevelDone(index) => {
                    let level = current
                        .as_ref()
                        .res(|| format!("level {} is not initialized", index))?;
                    on_level_done(&LevelReport {
                        schedule: &level.schedule,
                        targets: &level.targets,
                        textures: &level.textures,
                    })?;
                    if index + 1 < schedule.len() {
                        LevelState::LevelInit(index + 1)
                    } else {
                        LevelState::Finished
                    }
                }
                LevelState::Finished => break,
            };
        }

        let level = current.res(|| "optimization produced no level".to_string())?;
        Ok(OptimizationResult {
            targets: level.targets,
            textures: level.textures,
            geometry: level.geometry,
            energies,
        })
    }

    fn init_level(
        &self,
        schedule: &LevelSchedule,
        origin_size: (u32, u32),
        previous: Option<Level>,
        origin_geometry: Option<&Arc<ViewGeometry>>,
    ) -> Level {
        let (width, height) = schedule.size;
        info!(
            "level {}: {}x{}, {} iterations",
            schedule.index, width, height, schedule.iterations
        );

        let (geometry, scale) = match origin_geometry {
            Some(geometry) => (
                geometry.clone(),
                PixelScale::new(schedule.factor, schedule.size, geometry.size),
            ),
            None => {
                let cameras = scale_cameras(self.cameras, origin_size, schedule.size);
                let geometry =
                    ViewGeometry::build(self.mesh, self.views, &cameras, schedule.size);
                (Arc::new(geometry), PixelScale::identity(schedule.size))
            }
        };

        let sources = self
            .views
            .par_map(|id| resize_image(&self.sources[&id], width, height));
        let (targets, textures) = match previous {
            Some(previous) => (
                self.views
                    .par_map(|id| resize_image(&previous.targets[&id], width, height)),
                self.views
                    .par_map(|id| resize_image(&previous.textures[&id], width, height)),
            ),
            None => (sources.clone(), sources.clone()),
        };

        Level {
            schedule: *schedule,
            geometry,
            scale,
            sources,
            targets,
            textures,
        }
    }

    fn match_patches(
        &self,
        level: &Level,
        id: ViewId,
        direction: MatchDirection,
    ) -> Option<PatchField> {
        let (source, target) = (&level.sources[&id], &level.targets[&id]);
        let (query, reference) = match direction {
            MatchDirection::SourceToTarget => (source, target),
            MatchDirection::TargetToSource => (target, source),
        };
        let label = format!("{}_{}", id, direction.label());

        match self
            .oracle
            .compute(query, reference, self.params.patch_width, &label)
        {
            Ok(field) => Some(field),
            Err(err) => {
                warn!(
                    "  {} patch matching failed for view {}: {}",
                    direction.label(),
                    id,
                    err
                );
                None
            }
        }
    }

    /// One similarity and consistency pass over every view.
    fn iterate(
        &self,
        level: &Level,
        iteration: usize,
    ) -> (ViewMap<RgbImage>, ViewMap<RgbImage>, EnergyRecord) {
        let start = Instant::now();
        let params = self.params;
        let area = (params.patch_width * params.patch_width) as f64;
        let size = level.schedule.size;

        let fields = self.views.par_map(|id| {
            (
                self.match_patches(level, id, MatchDirection::SourceToTarget),
                self.match_patches(level, id, MatchDirection::TargetToSource),
            )
        });

        let similarity: f64 = fields
            .values()
            .map(|(s2t, t2s)| {
                let cost = |field: &Option<PatchField>| {
                    field.as_ref().map(|f| f.total_cost()).unwrap_or(0.0)
                };
                params.alpha_u * cost(s2t) / area + params.alpha_v * cost(t2s) / area
            })
            .sum();

        let context = BlendContext {
            views: self.views,
            geometry: &level.geometry,
            scale: level.scale,
        };

        let targets = self.views.par_map(|id| {
            let source = &level.sources[&id];
            let (s2t, t2s) = &fields[&id];
            let s2t = s2t.as_ref().map(|field| {
                accumulate_votes(
                    source,
                    size,
                    field,
                    MatchDirection::SourceToTarget,
                    params.patch_width,
                )
            });
            let t2s = t2s.as_ref().map(|field| {
                accumulate_votes(
                    source,
                    size,
                    field,
                    MatchDirection::TargetToSource,
                    params.patch_width,
                )
            });
            context.regenerate_target(
                id,
                params,
                s2t.as_ref(),
                t2s.as_ref(),
                &level.targets[&id],
                &level.textures,
            )
        });

        let textures = self.views.par_map(|id| {
            context.regenerate_texture(id, &targets, &level.textures[&id])
        });
        let consistency = textures.values().map(|(_, energy)| energy).sum::<f64>();
        let textures = textures
            .into_iter()
            .map(|(id, (texture, _))| (id, texture))
            .collect();

        debug!(
            "  iteration {}: similarity {:.1}, consistency {:.1}",
            iteration, similarity, consistency
        );
        log_elapsed(start, &format!("iteration {}", iteration));

        let energy = EnergyRecord {
            level: level.schedule.index,
            width: size.0,
            height: size.1,
            iteration,
            similarity,
            consistency,
        };
        (targets, textures, energy)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    use image::Rgb;

    use crate::fixtures::*;
    use crate::patch_match::PatchMatch;

    struct FailingOracle;

    impl PatchOracle for FailingOracle {
        fn compute(
            &self,
            _: &RgbImage,
            _: &RgbImage,
            _: u32,
            label: &str,
        ) -> Result<PatchField> {
            Err(Error::new(OracleError, format!("no field for {}", label)))
        }
    }

    fn params(args: &[&str]) -> OptimizeParams {
        let mut all = vec!["texalign"];
        all.extend_from_slice(args);
        OptimizeParams::from_iter_safe(all).unwrap()
    }

    fn constant_sources(views: &ViewIndex, color: [u8; 3]) -> ViewMap<RgbImage> {
        views.map(|_| RgbImage::from_pixel(32, 32, Rgb(color)))
    }

    #[test]
    fn test_geometry_resolution_from_str() {
        assert_eq!(
            "origin".parse::<GeometryResolution>().unwrap(),
            GeometryResolution::Origin
        );
        assert_eq!(GeometryResolution::Level.to_string(), "level");
        let err = "coarse".parse::<GeometryResolution>().unwrap_err();
        assert_eq!(err.kind, InvalidConfig);
    }

    #[test]
    fn test_validate() {
        assert!(params(&[]).validate().is_ok());
        assert!(params(&["--lambda=-1"]).validate().is_err());
        assert!(params(&["--alpha-u=-0.5"]).validate().is_err());
        assert!(params(&["--alpha-v=-2"]).validate().is_err());
        assert!(params(&["--patch-width", "0"]).validate().is_err());
        assert!(params(&["--levels", "0"]).validate().is_err());
    }

    #[test]
    fn test_constant_color_single_view() {
        let (views, cameras) = one_view();
        let sources = constant_sources(&views, [90, 150, 30]);
        let params = params(&["--levels", "1", "--initial-iterations", "1", "-w", "3"]);
        let oracle = PatchMatch {
            iterations: 2,
            seed: 0,
        };
        let mesh = quad_mesh();
        let optimizer = Optimizer {
            params: &params,
            mesh: &mesh,
            views: &views,
            cameras: &cameras,
            sources: &sources,
            oracle: &oracle,
        };

        let result = optimizer.run(|_| Ok(())).unwrap();
        let id = views.ids()[0];
        for image in [&result.targets[&id], &result.textures[&id]] {
            assert!(image.pixels().all(|p| *p == Rgb([90, 150, 30])));
        }
        assert_eq!(result.energies.len(), 1);
        assert_eq!(result.energies[0].similarity, 0.0);
        assert_eq!(result.energies[0].consistency, 0.0);
    }

    #[test]
    fn test_levels_reported_in_order() {
        let (views, cameras) = two_views();
        let sources = constant_sources(&views, [10, 20, 30]);
        let params = params(&[
            "--levels",
            "2",
            "--initial-iterations",
            "2",
            "--iteration-decrement",
            "1",
            "-w",
            "3",
            "--geometry-resolution",
            "origin",
        ]);
        let oracle = PatchMatch {
            iterations: 1,
            seed: 3,
        };
        let mesh = quad_mesh();
        let optimizer = Optimizer {
            params: &params,
            mesh: &mesh,
            views: &views,
            cameras: &cameras,
            sources: &sources,
            oracle: &oracle,
        };

        let mut reported = Vec::new();
        let result = optimizer
            .run(|report| {
                reported.push(report.schedule.size);
                assert_eq!(report.targets.len(), 2);
                Ok(())
            })
            .unwrap();

        assert_eq!(reported, vec![(16, 16), (32, 32)]);
        let iterations: Vec<_> =
            result.energies.iter().map(|e| (e.level, e.iteration)).collect();
        assert_eq!(iterations, vec![(0, 0), (0, 1), (1, 0)]);
        assert_eq!(result.geometry.size, IMAGE_SIZE);
        for image in result.targets.values() {
            assert!(image.pixels().all(|p| *p == Rgb([10, 20, 30])));
        }
    }

    #[test]
    fn test_failing_oracle_keeps_sources() {
        let (views, cameras) = one_view();
        let sources = views.map(|_| {
            RgbImage::from_fn(32, 32, |x, y| Rgb([(x * 8) as u8, (y * 8) as u8, 0]))
        });
        let params = params(&["--levels", "1", "--initial-iterations", "1"]);
        let mesh = quad_mesh();
        let optimizer = Optimizer {
            params: &params,
            mesh: &mesh,
            views: &views,
            cameras: &cameras,
            sources: &sources,
            oracle: &FailingOracle,
        };

        let result = optimizer.run(|_| Ok(())).unwrap();
        let id = views.ids()[0];
        assert_eq!(result.targets[&id], sources[&id]);
        assert_eq!(result.textures[&id], sources[&id]);
        assert_eq!(result.energies[0].similarity, 0.0);
    }

    #[test]
    fn test_level_callback_error_stops() {
        let (views, cameras) = one_view();
        let sources = constant_sources(&views, [0, 0, 0]);
        let params = params(&["--levels", "1", "--initial-iterations", "1"]);
        let mesh = quad_mesh();
        let optimizer = Optimizer {
            params: &params,
            mesh: &mesh,
            views: &views,
            cameras: &cameras,
            sources: &sources,
            oracle: &FailingOracle,
        };

        match optimizer.run(|_| Err(Error::new(IoError, "disk full"))) {
            Ok(_) => panic!("optimization should stop on a callback error"),
            Err(err) => assert_eq!(err.kind, IoError),
        }
    }
}
