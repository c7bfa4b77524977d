use super::map::map_record;
use crate::core::io::pdb::{self, ReadOptions};
use crate::core::models::conformation::{ConformationRecord, FeatureData};
use crate::core::models::structure::Structure;
use crate::core::store::Database;
use crate::engine::augment::{self, Augmenter};
use crate::engine::catalog::{self, ConformationJob};
use crate::engine::config::CreateConfig;
use crate::engine::discovery::StructureSource;
use crate::engine::error::EngineError;
use crate::engine::features::{
    ImportSources, ModuleRegistry, TargetContext, compute_features, compute_targets,
};
use crate::engine::mapping::{MappingEngine, resolve_feature_names};
use crate::engine::progress::{Progress, ProgressReporter};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::{debug, info, instrument, warn};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct CreateSummary {
    /// Records written, replicas included, in the order they were stored.
    pub stored: Vec<String>,
    /// Conformations (and their replicas) left out because the complex could not be read.
    pub skipped: Vec<String>,
    /// Conformations stored without a reference structure.
    pub complex_only: Vec<String>,
    /// Records stored without grids because mapping them failed.
    pub unmapped: Vec<String>,
    /// Channels zero-filled across all mapped records.
    pub zero_filled: usize,
}

fn load_structure(name: &str, path: &Path, options: &ReadOptions) -> Result<Structure, EngineError> {
    pdb::load(path, options).map_err(|source| EngineError::Parse {
        name: name.to_string(),
        source,
    })
}

/// Maps one record in place. A failure confined to the conformation leaves
/// the record without grids and is noted in the summary.
fn map_or_keep(
    engine: &MappingEngine<'_>,
    structure: &Structure,
    name: &str,
    record: &mut ConformationRecord,
    feature_names: &[String],
    summary: &mut CreateSummary,
    reporter: &ProgressReporter,
) -> Result<(), EngineError> {
    match map_record(engine, structure, record, feature_names) {
        Ok(zero_filled) => summary.zero_filled += zero_filled,
        Err(err) if err.is_per_conformation() => {
            warn!(conformation = name, "{err}; storing the record without grids");
            reporter.skipped(name, &err);
            summary.unmapped.push(name.to_string());
        }
        Err(err) => return Err(err),
    }
    Ok(())
}

/// The feature and target sources of one run.
pub(crate) struct Attachments<'a> {
    pub registry: &'a ModuleRegistry,
    pub imports: ImportSources,
    pub features: &'a [String],
    pub targets: &'a [String],
}

impl Attachments<'_> {
    /// Imported blocks first, then the configured modules on top.
    pub fn features(
        &self,
        name: &str,
        complex: &Structure,
    ) -> Result<BTreeMap<String, FeatureData>, EngineError> {
        let mut blocks = BTreeMap::new();
        if !self.imports.is_empty() {
            match self.imports.import_features(name) {
                Ok(imported) => blocks.extend(imported),
                Err(err) if err.is_per_conformation() => warn!("{err}; no features imported"),
                Err(err) => return Err(err),
            }
        }
        for module_name in self.features {
            let module = self.registry.feature(module_name)?;
            match compute_features(module, complex) {
                Ok(computed) => blocks.extend(computed),
                Err(err) => warn!(conformation = name, "{err}; feature left out"),
            }
        }
        Ok(blocks)
    }

    pub fn targets(&self, ctx: &TargetContext<'_>) -> Result<BTreeMap<String, f64>, EngineError> {
        let mut targets = BTreeMap::new();
        if !self.imports.is_empty() {
            match self.imports.import_targets(ctx.name) {
                Ok(imported) => targets.extend(imported),
                Err(err) if err.is_per_conformation() => warn!("{err}; no targets imported"),
                Err(err) => return Err(err),
            }
        }
        for module_name in self.targets {
            let module = self.registry.target(module_name)?;
            match compute_targets(module, ctx) {
                Ok(computed) => targets.extend(computed),
                Err(err) => warn!(conformation = ctx.name, "{err}; target left out"),
            }
        }
        Ok(targets)
    }
}

/// Builds a new collection from the structures offered by `source`.
///
/// Every catalogued conformation is stored with its complex, its native when
/// one was paired, its features and targets and, when mapping is configured,
/// its grids. Each replica is an independently drawn rotation of the origin's
/// complex; it shares the origin's native, features and targets unchanged and
/// is mapped on its own.
#[instrument(skip_all, name = "create_workflow")]
pub fn run(
    source: &dyn StructureSource,
    registry: &ModuleRegistry,
    config: &CreateConfig,
    reporter: &ProgressReporter,
) -> Result<CreateSummary, EngineError> {
    // === Phase 0: Preparation ===
    reporter.report(Progress::PhaseStart {
        name: "Preparation",
    });
    registry.validate(&config.features, &config.targets)?;
    let engine = config
        .mapping
        .as_ref()
        .map(MappingEngine::new)
        .transpose()?;
    let attachments = Attachments {
        registry,
        imports: ImportSources::open(&config.import_from)?,
        features: &config.features,
        targets: &config.targets,
    };
    let catalog = catalog::build(source, config.allow_list.as_ref(), config.augmentation)?;
    let mut db = Database::create(&config.database_path)?;
    let mut augmenter = Augmenter::new(config.seed);
    info!(
        path = %config.database_path.display(),
        jobs = catalog.jobs.len(),
        augmentation = config.augmentation,
        mapping = engine.is_some(),
        "Creating collection"
    );
    reporter.report(Progress::PhaseFinish);

    // === Phase 1: Conformations and their replicas ===
    reporter.report(Progress::PhaseStart {
        name: "Conformations",
    });
    reporter.report(Progress::TaskStart {
        total_steps: catalog.jobs.len() as u64,
    });
    let mut summary = CreateSummary::default();
    let mut feature_names: Option<Vec<String>> = None;

    for job in catalog.origins() {
        let replicas: Vec<&ConformationJob> = catalog.replicas_of(&job.origin).collect();

        let complex = match load_structure(&job.name, &job.complex, &config.read_options) {
            Ok(structure) => structure,
            Err(err) => {
                warn!("{err}; skipping the conformation and its replicas");
                reporter.skipped(&job.name, &err);
                summary.skipped.push(job.name.clone());
                summary
                    .skipped
                    .extend(replicas.iter().map(|replica| replica.name.clone()));
                for _ in 0..=replicas.len() {
                    reporter.report(Progress::TaskIncrement);
                }
                continue;
            }
        };
        let native = match &job.native {
            Some(path) => match load_structure(&job.name, path, &config.read_options) {
                Ok(structure) => Some(structure),
                Err(err) => {
                    warn!("{err}; storing the complex only");
                    None
                }
            },
            None => None,
        };
        if native.is_none() {
            summary.complex_only.push(job.name.clone());
        }

        let features = attachments.features(&job.name, &complex)?;
        let targets = attachments.targets(&TargetContext {
            name: &job.name,
            complex: &complex,
            native: native.as_ref(),
            features: &features,
        })?;
        let mut record = ConformationRecord {
            complex: Some(pdb::serialize(complex.atoms())),
            native: native.as_ref().map(|n| pdb::serialize(n.atoms())),
            features,
            targets,
            ..Default::default()
        };

        if let (Some(engine), Some(mapping)) = (&engine, &config.mapping) {
            if feature_names.is_none() {
                feature_names = Some(resolve_feature_names(
                    mapping.features.as_deref(),
                    &record.features,
                )?);
            }
            let names = feature_names.as_deref().unwrap_or_default();
            map_or_keep(engine, &complex, &job.name, &mut record, names, &mut summary, reporter)?;
        }
        db.put(&job.name, &record)?;
        summary.stored.push(job.name.clone());
        reporter.report(Progress::TaskIncrement);

        for replica in replicas {
            let augmentation = augmenter.draw();
            let rotated = augment::apply(&complex, &augmentation);
            let mut copy = ConformationRecord {
                complex: Some(pdb::serialize(rotated.atoms())),
                native: record.native.clone(),
                features: record.features.clone(),
                targets: record.targets.clone(),
                augmentation: Some(augmentation),
                ..Default::default()
            };
            if let Some(engine) = &engine {
                let names = feature_names.as_deref().unwrap_or_default();
                map_or_keep(engine, &rotated, &replica.name, &mut copy, names, &mut summary, reporter)?;
            }
            db.put(&replica.name, &copy)?;
            debug!(
                replica = %replica.name,
                axis = ?augmentation.axis,
                angle = augmentation.angle,
                "Stored augmentation replica"
            );
            summary.stored.push(replica.name.clone());
            reporter.report(Progress::TaskIncrement);
        }
    }
    reporter.report(Progress::TaskFinish);
    reporter.report(Progress::PhaseFinish);

    info!(
        stored = summary.stored.len(),
        skipped = summary.skipped.len(),
        complex_only = summary.complex_only.len(),
        unmapped = summary.unmapped.len(),
        "Collection created"
    );
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::grid::spec::Anchor;
    use crate::core::models::atom::Atom;
    use crate::engine::catalog::AllowList;
    use crate::engine::config::{CreateConfigBuilder, DensitySpec, MappingConfigBuilder};
    use crate::engine::discovery::{Candidate, StaticSource};
    use nalgebra::Point3;
    use std::path::PathBuf;

    fn dimer(shift: f64) -> Vec<Atom> {
        vec![
            Atom::new(1, "N", "ALA", 'A', 1, Point3::new(shift, 0.0, 0.0)),
            Atom::new(2, "C", "ALA", 'A', 1, Point3::new(shift + 1.4, 0.3, 0.0)),
            Atom::new(3, "O", "GLY", 'B', 2, Point3::new(shift, 2.5, 0.5)),
            Atom::new(4, "C", "GLY", 'B', 2, Point3::new(shift + 0.7, 3.1, -0.4)),
        ]
    }

    fn write_atoms(dir: &Path, name: &str, atoms: &[Atom]) -> PathBuf {
        let path = dir.join(format!("{name}.pdb"));
        std::fs::write(&path, pdb::serialize(atoms).join("\n")).unwrap();
        path
    }

    fn write_structure(dir: &Path, name: &str, shift: f64) -> PathBuf {
        write_atoms(dir, name, &dimer(shift))
    }

    struct Fixture {
        dir: tempfile::TempDir,
        source: StaticSource,
    }

    fn fixture() -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let native = write_structure(dir.path(), "1AK4", 0.0);
        let decoy = write_structure(dir.path(), "1AK4_7w", 0.4);
        let source = StaticSource {
            complexes: vec![Candidate::new("1AK4_7w", decoy)],
            natives: vec![Candidate::new("1AK4", native)],
        };
        Fixture { dir, source }
    }

    fn config(dir: &Path) -> CreateConfigBuilder {
        CreateConfigBuilder::new()
            .database_path(dir.join("train.db"))
            .features(vec!["occupancy".into()])
            .targets(vec!["binary_class".into()])
            .seed(7)
    }

    fn mapping() -> crate::engine::config::MappingConfig {
        MappingConfigBuilder::new()
            .points([6, 6, 6])
            .resolution([1.0, 1.0, 1.0])
            .anchor(Anchor::Centroid)
            .densities(vec![DensitySpec::new("C", 1.7)])
            .build()
            .unwrap()
    }

    #[test]
    fn creates_conformation_and_named_replicas() {
        let fx = fixture();
        let config = config(fx.dir.path())
            .augmentation(2)
            .mapping(mapping())
            .build()
            .unwrap();
        let summary = run(
            &fx.source,
            &ModuleRegistry::with_builtins(),
            &config,
            &ProgressReporter::new(),
        )
        .unwrap();
        assert_eq!(summary.stored, vec!["1AK4_7w", "1AK4_7w_r001", "1AK4_7w_r002"]);

        let db = Database::open(&config.database_path).unwrap();
        let names: Vec<_> = db.names().collect();
        assert_eq!(names, vec!["1AK4_7w", "1AK4_7w_r001", "1AK4_7w_r002"]);

        let origin = db.get("1AK4_7w").unwrap().unwrap();
        assert!(origin.native.is_some());
        assert!(origin.augmentation.is_none());
        assert_eq!(origin.targets["binary_class"], 0.0);
        assert_eq!(
            origin.features["occupancy"],
            FeatureData::PerAtom(vec![1.0; 4])
        );
        let channels: Vec<_> = origin.mapped_features.keys().cloned().collect();
        assert_eq!(channels, vec!["C", "occupancy"]);

        for name in ["1AK4_7w_r001", "1AK4_7w_r002"] {
            let replica = db.get(name).unwrap().unwrap();
            assert_eq!(replica.features, origin.features);
            assert_eq!(replica.targets, origin.targets);
            assert_eq!(replica.native, origin.native);
            assert_ne!(replica.complex, origin.complex);
            assert!(replica.augmentation.is_some());
            assert_eq!(
                replica.mapped_features.keys().collect::<Vec<_>>(),
                origin.mapped_features.keys().collect::<Vec<_>>()
            );
            assert_ne!(
                replica.mapped_features["C"].to_dense(),
                origin.mapped_features["C"].to_dense()
            );
        }
        let r1 = db.get("1AK4_7w_r001").unwrap().unwrap();
        let r2 = db.get("1AK4_7w_r002").unwrap().unwrap();
        assert_ne!(r1.augmentation, r2.augmentation);
    }

    #[test]
    fn unpaired_grids_cover_a_third_chain() {
        let fx = fixture();
        let mut atoms = dimer(0.0);
        atoms.push(Atom::new(5, "C", "SER", 'C', 3, Point3::new(3.0, -1.5, 2.0)));
        let trimer = write_atoms(fx.dir.path(), "3HFM_1w", &atoms);
        let source = StaticSource {
            complexes: vec![Candidate::new("3HFM_1w", trimer)],
            natives: Vec::new(),
        };

        let config = config(fx.dir.path()).mapping(mapping()).build().unwrap();
        run(
            &source,
            &ModuleRegistry::with_builtins(),
            &config,
            &ProgressReporter::new(),
        )
        .unwrap();

        let db = Database::open(&config.database_path).unwrap();
        let record = db.get("3HFM_1w").unwrap().unwrap();
        let axes = record.grid_points.as_ref().unwrap();
        let target = Point3::new(3.0, -1.5, 2.0);
        let cell = (0..axes.cell_count())
            .min_by(|&x, &y| {
                let (i, j, k) = axes.cell_of(x);
                let (p, q, r) = axes.cell_of(y);
                let dx = (axes.point(i, j, k) - target).norm();
                let dy = (axes.point(p, q, r) - target).norm();
                dx.total_cmp(&dy)
            })
            .unwrap();
        assert!(record.mapped_features["C"].to_dense()[cell] > 0.0);
        assert!(record.mapped_features["occupancy"].to_dense()[cell] > 0.0);
    }

    #[test]
    fn paired_mapping_without_chains_a_and_b_stores_records_unmapped() {
        let fx = fixture();
        let antibody = write_atoms(
            fx.dir.path(),
            "1MLC_3w",
            &[
                Atom::new(1, "C", "ALA", 'H', 1, Point3::new(0.0, 0.0, 0.0)),
                Atom::new(2, "N", "ALA", 'H', 1, Point3::new(1.3, 0.2, 0.0)),
                Atom::new(3, "C", "GLY", 'L', 2, Point3::new(0.5, 2.8, 0.3)),
            ],
        );
        let mut source = fx.source.clone();
        source.complexes.push(Candidate::new("1MLC_3w", antibody));

        let paired = MappingConfigBuilder::new()
            .points([6, 6, 6])
            .resolution([1.0, 1.0, 1.0])
            .anchor(Anchor::Centroid)
            .densities(vec![DensitySpec::new("C", 1.7).chain_paired()])
            .build()
            .unwrap();
        let config = config(fx.dir.path())
            .augmentation(1)
            .mapping(paired)
            .build()
            .unwrap();
        let summary = run(
            &source,
            &ModuleRegistry::with_builtins(),
            &config,
            &ProgressReporter::new(),
        )
        .unwrap();
        assert_eq!(summary.unmapped, vec!["1MLC_3w", "1MLC_3w_r001"]);
        assert_eq!(summary.stored.len(), 4);

        let db = Database::open(&config.database_path).unwrap();
        let antibody = db.get("1MLC_3w").unwrap().unwrap();
        assert!(antibody.complex.is_some());
        assert!(!antibody.has_mapping());
        let paired = db.get("1AK4_7w").unwrap().unwrap();
        assert!(paired.mapped_features.contains_key("C_chainA"));
        assert!(paired.mapped_features.contains_key("occupancy"));
    }

    #[test]
    fn replica_rotation_preserves_interatomic_distances() {
        let fx = fixture();
        let config = config(fx.dir.path()).augmentation(1).build().unwrap();
        run(
            &fx.source,
            &ModuleRegistry::with_builtins(),
            &config,
            &ProgressReporter::new(),
        )
        .unwrap();

        let db = Database::open(&config.database_path).unwrap();
        let parse = |name: &str| {
            let record = db.get(name).unwrap().unwrap();
            pdb::parse_records(record.complex.unwrap(), &ReadOptions::default()).unwrap()
        };
        let origin = parse("1AK4_7w");
        let replica = parse("1AK4_7w_r001");
        let atoms = origin.atoms();
        let rotated = replica.atoms();
        for i in 0..atoms.len() {
            for j in i + 1..atoms.len() {
                let before = (atoms[i].position - atoms[j].position).norm();
                let after = (rotated[i].position - rotated[j].position).norm();
                // serialized coordinates carry three decimals
                assert!((before - after).abs() < 1e-2);
            }
        }
    }

    #[test]
    fn seeded_runs_store_identical_replicas() {
        let fx = fixture();
        let first = config(fx.dir.path()).augmentation(2).build().unwrap();
        let second = config(fx.dir.path())
            .database_path(fx.dir.path().join("again.db"))
            .augmentation(2)
            .build()
            .unwrap();
        let registry = ModuleRegistry::with_builtins();
        run(&fx.source, &registry, &first, &ProgressReporter::new()).unwrap();
        run(&fx.source, &registry, &second, &ProgressReporter::new()).unwrap();

        let a = Database::open(&first.database_path).unwrap();
        let b = Database::open(&second.database_path).unwrap();
        assert_eq!(a.get("1AK4_7w_r002").unwrap(), b.get("1AK4_7w_r002").unwrap());
    }

    #[test]
    fn existing_collection_is_never_overwritten() {
        let fx = fixture();
        let config = config(fx.dir.path()).build().unwrap();
        std::fs::write(&config.database_path, b"keep").unwrap();

        let err = run(
            &fx.source,
            &ModuleRegistry::with_builtins(),
            &config,
            &ProgressReporter::new(),
        )
        .unwrap_err();
        assert!(matches!(err, EngineError::AlreadyExists(_)));
        assert_eq!(std::fs::read(&config.database_path).unwrap(), b"keep");
    }

    #[test]
    fn unreadable_complex_skips_it_and_its_replicas() {
        let mut fx = fixture();
        let broken = fx.dir.path().join("1AK4_9w.pdb");
        std::fs::write(&broken, "ATOM      1  N   ALA A   1      1x.000   0.000   0.000").unwrap();
        fx.source.complexes.push(Candidate::new("1AK4_9w", broken));

        let config = config(fx.dir.path()).augmentation(1).build().unwrap();
        let summary = run(
            &fx.source,
            &ModuleRegistry::with_builtins(),
            &config,
            &ProgressReporter::new(),
        )
        .unwrap();
        assert_eq!(summary.skipped, vec!["1AK4_9w", "1AK4_9w_r001"]);
        let db = Database::open(&config.database_path).unwrap();
        assert_eq!(db.len(), 2);
        assert!(!db.contains("1AK4_9w"));
    }

    #[test]
    fn missing_native_yields_complex_only_record() {
        let mut fx = fixture();
        let orphan = write_structure(fx.dir.path(), "2OUL_1w", 1.0);
        fx.source.complexes.push(Candidate::new("2OUL_1w", orphan));

        let config = config(fx.dir.path()).build().unwrap();
        let summary = run(
            &fx.source,
            &ModuleRegistry::with_builtins(),
            &config,
            &ProgressReporter::new(),
        )
        .unwrap();
        assert_eq!(summary.complex_only, vec!["2OUL_1w"]);
        let db = Database::open(&config.database_path).unwrap();
        let record = db.get("2OUL_1w").unwrap().unwrap();
        assert!(record.complex.is_some());
        assert!(record.native.is_none());
    }

    #[test]
    fn allow_list_restricts_conformations() {
        let mut fx = fixture();
        let other = write_structure(fx.dir.path(), "1ATN_2w", 0.0);
        fx.source.complexes.push(Candidate::new("1ATN_2w", other));

        let config = config(fx.dir.path())
            .allow_list(AllowList::new(vec!["1ATN".into()]))
            .build()
            .unwrap();
        let summary = run(
            &fx.source,
            &ModuleRegistry::with_builtins(),
            &config,
            &ProgressReporter::new(),
        )
        .unwrap();
        assert_eq!(summary.stored, vec!["1ATN_2w"]);
    }

    #[test]
    fn features_and_targets_are_imported_from_existing_collections() {
        let fx = fixture();
        let import_path = fx.dir.path().join("precomputed.db");
        {
            let mut source = Database::create(&import_path).unwrap();
            let mut record = ConformationRecord::default();
            record
                .features
                .insert("charge".into(), FeatureData::PerAtom(vec![0.1, 0.2, 0.3, 0.4]));
            record.targets.insert("irmsd".into(), 3.5);
            source.put("1AK4_7w", &record).unwrap();
        }

        let config = config(fx.dir.path())
            .features(Vec::new())
            .targets(Vec::new())
            .import_from(vec![import_path])
            .augmentation(1)
            .build()
            .unwrap();
        run(
            &fx.source,
            &ModuleRegistry::with_builtins(),
            &config,
            &ProgressReporter::new(),
        )
        .unwrap();

        let db = Database::open(&config.database_path).unwrap();
        let replica = db.get("1AK4_7w_r001").unwrap().unwrap();
        assert_eq!(replica.targets["irmsd"], 3.5);
        assert!(replica.features.contains_key("charge"));
    }

    #[test]
    fn unknown_module_fails_before_creating_the_collection() {
        let fx = fixture();
        let config = config(fx.dir.path())
            .features(vec!["electrostatics".into()])
            .build()
            .unwrap();
        let err = run(
            &fx.source,
            &ModuleRegistry::with_builtins(),
            &config,
            &ProgressReporter::new(),
        )
        .unwrap_err();
        assert!(matches!(err, EngineError::Feature(_)));
        assert!(!config.database_path.exists());
    }
}
