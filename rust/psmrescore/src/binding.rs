//! Binding affinity prediction with an external predictor (netMHCpan).
//!
//! Upstream writes one input file per peptide length into
//! `{outputFolder}/mhcpan/inputLen<length>...`. Every (allele, input file)
//! pair whose length is within `baPredLimit` becomes one predictor run, and
//! runs are spread over a pool of `nCores` workers. Each run writes its own
//! output file, so workers share nothing.

use crate::config::PipelineConfig;
use crate::errors::{
    RescoreError,
    Result,
};
use indicatif::{
    ParallelProgressIterator,
    ProgressStyle,
};
use rayon::prelude::*;
use regex::Regex;
use std::fs::File;
use std::path::{
    Path,
    PathBuf,
};
use std::process::{
    Command,
    Stdio,
};
use std::sync::LazyLock;
use std::time::Instant;
use tracing::{
    debug,
    info,
    warn,
};

pub const BINDING_DIR: &str = "mhcpan";
const INPUT_PREFIX: &str = "inputLen";
/// Where the docker image sees the host output folder.
const DOCKER_OUTPUT_MOUNT: &str = "/root/output";
const PAN_EXECUTABLE: &str = "netMHCpan";

static INPUT_LENGTH: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"inputLen(\d+)").expect("valid regex"));

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BindingTask {
    pub allele: String,
    pub peptide_length: usize,
    pub input_file: String,
    pub output_file: String,
}

/// `inputLen9.txt` for allele `HLA-A*02:01` becomes `output_9_HLA-A*02-01.txt`.
pub fn output_file_name(input_file: &str, peptide_length: usize, allele: &str) -> String {
    input_file
        .replace(
            &format!("{}{}", INPUT_PREFIX, peptide_length),
            &format!("output_{}_{}", peptide_length, allele),
        )
        .replace(':', "-")
}

pub fn input_file_length(input_file: &str) -> Option<usize> {
    INPUT_LENGTH
        .captures(input_file)
        .and_then(|c| c[1].parse().ok())
}

/// Every (allele, input file) run, skipping lengths above `length_limit`.
pub fn plan_tasks(input_files: &[String], alleles: &[String], length_limit: usize) -> Vec<BindingTask> {
    let mut tasks = Vec::new();
    for allele in alleles {
        for input_file in input_files {
            let Some(peptide_length) = input_file_length(input_file) else {
                warn!("Cannot read a peptide length from {}, skipping", input_file);
                continue;
            };
            if peptide_length > length_limit {
                continue;
            }
            tasks.push(BindingTask {
                allele: allele.clone(),
                peptide_length,
                output_file: output_file_name(input_file, peptide_length, allele),
                input_file: input_file.clone(),
            });
        }
    }
    tasks
}

/// Predictor input files in `binding_dir`, sorted by name.
pub fn list_input_files(binding_dir: &Path) -> Result<Vec<String>> {
    let entries = std::fs::read_dir(binding_dir).map_err(|e| RescoreError::io(e, binding_dir))?;
    let mut files = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| RescoreError::io(e, binding_dir))?;
        let name = entry.file_name().to_string_lossy().into_owned();
        if name.starts_with(INPUT_PREFIX) {
            files.push(name);
        }
    }
    files.sort();
    Ok(files)
}

fn pan_args(task: &BindingTask, input_path: &str) -> Vec<String> {
    vec![
        "-BA".to_string(),
        "-inptype".to_string(),
        "1".to_string(),
        "-a".to_string(),
        task.allele.clone(),
        "-l".to_string(),
        task.peptide_length.to_string(),
        "-p".to_string(),
        "-f".to_string(),
        input_path.to_string(),
    ]
}

/// How a predictor run is started.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Launcher {
    Native {
        pan_command: PathBuf,
        binding_dir: PathBuf,
    },
    Docker {
        image: String,
        /// Host directory of the predictor installation.
        pan_dir: PathBuf,
        mount: String,
        /// Host output folder, mounted at `/root/output`.
        output_folder: PathBuf,
    },
}

impl Launcher {
    pub fn from_config(config: &PipelineConfig) -> Result<Self> {
        let binding = &config.binding;
        if !binding.pan_docker {
            return Ok(Launcher::Native {
                pan_command: binding.pan_command.clone(),
                binding_dir: config.output_folder.join(BINDING_DIR),
            });
        }

        let pan_command = binding.pan_command.to_string_lossy();
        let pan_dir = pan_command
            .strip_suffix(&format!("/{}", PAN_EXECUTABLE))
            .unwrap_or(&pan_command);
        let absolute = |p: &Path| std::path::absolute(p).map_err(|e| RescoreError::io(e, p));
        Ok(Launcher::Docker {
            image: binding.docker_image.clone(),
            pan_dir: absolute(Path::new(pan_dir))?,
            mount: binding.docker_mount.clone(),
            output_folder: absolute(&config.output_folder)?,
        })
    }

    /// Command for one task, without its stdout redirection.
    pub fn command(&self, task: &BindingTask) -> Command {
        match self {
            Launcher::Native {
                pan_command,
                binding_dir,
            } => {
                let input = binding_dir.join(&task.input_file);
                let mut cmd = Command::new(pan_command);
                cmd.args(pan_args(task, &input.to_string_lossy()));
                cmd
            }
            Launcher::Docker {
                image,
                pan_dir,
                mount,
                output_folder,
            } => {
                let input = format!("{}/{}/{}", DOCKER_OUTPUT_MOUNT, BINDING_DIR, task.input_file);
                let mut cmd = Command::new("docker");
                cmd.arg("run")
                    .arg("-v")
                    .arg(format!("{}:{}", pan_dir.display(), mount))
                    .arg("-v")
                    .arg(format!("{}:{}", output_folder.display(), DOCKER_OUTPUT_MOUNT))
                    .arg("-e")
                    .arg(format!("PAN_ARGS={}", pan_args(task, &input).join(" ")))
                    .arg(image);
                cmd
            }
        }
    }

    /// One-time setup before any task runs: pulls the docker image so the
    /// workers do not race to pull it.
    pub fn prepare(&self) {
        let Launcher::Docker { image, .. } = self else {
            return;
        };
        info!("Pulling docker image {}", image);
        match Command::new("docker")
            .args(["image", "pull", image.as_str()])
            .stdout(Stdio::null())
            .status()
        {
            Ok(status) if status.success() => {}
            Ok(status) => warn!("docker image pull {} exited with {}", image, status),
            Err(e) => warn!("Could not run docker image pull {}: {}", image, e),
        }
    }
}

fn run_task(launcher: &Launcher, task: &BindingTask, binding_dir: &Path) -> std::result::Result<PathBuf, String> {
    let output_path = binding_dir.join(&task.output_file);
    let output = File::create(&output_path)
        .map_err(|e| format!("{}: {}", output_path.display(), e))?;
    let status = launcher
        .command(task)
        .stdout(Stdio::from(output))
        .status()
        .map_err(|e| format!("{} ({}): {}", task.input_file, task.allele, e))?;
    if !status.success() {
        return Err(format!(
            "{} ({}) exited with {}",
            task.input_file, task.allele, status
        ));
    }
    debug!("Wrote {}", output_path.display());
    Ok(output_path)
}

/// Runs the predictor for every allele and input length.
///
/// All tasks run to completion; failures are reported together afterwards.
#[tracing::instrument(skip_all)]
pub fn predict_binding(config: &PipelineConfig) -> Result<Vec<PathBuf>> {
    let binding_dir = config.output_folder.join(BINDING_DIR);
    let input_files = list_input_files(&binding_dir)?;
    let tasks = plan_tasks(&input_files, &config.alleles, config.ba_pred_limit);
    info!(
        "Predicting binding for {} alleles over {} input files ({} runs)",
        config.alleles.len(),
        input_files.len(),
        tasks.len()
    );
    if tasks.is_empty() {
        return Ok(Vec::new());
    }

    let launcher = Launcher::from_config(config)?;
    launcher.prepare();

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(config.n_cores.max(1))
        .build()?;
    let style = ProgressStyle::with_template(
        "{spinner:.green} [{elapsed_precise}] [{wide_bar:.cyan/blue}] {pos}/{len} ({eta})",
    )
    .unwrap_or_else(|_| ProgressStyle::default_bar());

    let st = Instant::now();
    let results: Vec<std::result::Result<PathBuf, String>> = pool.install(|| {
        tasks
            .par_iter()
            .progress_with_style(style)
            .map(|task| run_task(&launcher, task, &binding_dir))
            .collect()
    });

    let total = results.len();
    let (outputs, failures): (Vec<_>, Vec<_>) = results.into_iter().partition(|r| r.is_ok());
    let failures: Vec<String> = failures.into_iter().filter_map(|r| r.err()).collect();
    if let Some(first) = failures.first() {
        return Err(RescoreError::PredictorFailed {
            failed: failures.len(),
            total,
            first: first.clone(),
        });
    }
    info!("Finished {} binding predictions in {:?}", total, st.elapsed());
    Ok(outputs.into_iter().filter_map(|r| r.ok()).collect())
}
