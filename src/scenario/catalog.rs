//! Built-in scenarios for the three course systems
//!
//! Each builder turns a [`Config`] into a fresh [`Scenario`]; nothing is
//! cached between runs.

use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use clap::ValueEnum;
use uuid::Uuid;

use crate::client::ClientInvocation;
use crate::common::config::{Config, ToolsConfig};
use crate::environment::EnvironmentDescriptor;
use crate::health::HealthEndpoint;
use crate::verify::{HashAlgorithm, VerificationRule, DEFAULT_CHUNK_SIZE};

use super::config::{Operation, Scenario};

/// Matches the job id printed by the job client
pub const JOB_ID_PATTERN: &str = r"job_id:\s*([0-9a-fA-F\-]{36})";

/// The systems that have a built-in scenario
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum SystemKind {
    /// Block storage: upload, download, compare digests
    Storage,
    /// Commit log: create topic, produce, consume
    Log,
    /// Map-reduce: submit word count, compare partitions to snapshots
    Job,
}

impl SystemKind {
    pub fn name(&self) -> &'static str {
        match self {
            SystemKind::Storage => "storage",
            SystemKind::Log => "log",
            SystemKind::Job => "job",
        }
    }
}

/// Build the scenario for `kind`
pub fn build(kind: SystemKind, config: &Config) -> Scenario {
    match kind {
        SystemKind::Storage => storage(config),
        SystemKind::Log => log(config),
        SystemKind::Job => job(config),
    }
}

/// Upload a file, download it again, and compare the two digests
pub fn storage(config: &Config) -> Scenario {
    let settings = &config.storage;
    let project = config.project_dir(&settings.project);
    let client = project.join("client");
    let test_file = project.join(&settings.test_file);
    let downloaded = config.paths.work_dir.join(&settings.download_name);

    let timed = |invocation: ClientInvocation| match settings.timeout_secs {
        Some(secs) => invocation.with_timeout(Duration::from_secs(secs)),
        None => invocation,
    };

    Scenario {
        name: SystemKind::Storage.name().to_string(),
        description: Some("Upload a file and download it back unchanged".to_string()),
        environment: compose(&project),
        health: endpoints(&settings.ports),
        dependencies: vec![pip_install(&config.tools, &client)],
        vars: BTreeMap::new(),
        steps: vec![
            Operation::Invoke {
                run: timed(python(
                    &config.tools,
                    &client.join("upload.py"),
                    [display(&test_file), settings.remote_name.clone()],
                )),
                capture: Some("upload".to_string()),
            },
            Operation::RemoveFile {
                path: downloaded.clone(),
            },
            Operation::Invoke {
                run: timed(python(
                    &config.tools,
                    &client.join("download.py"),
                    [settings.remote_name.clone(), display(&downloaded)],
                )),
                capture: Some("download".to_string()),
            },
        ],
        verify: VerificationRule::HashEquality {
            left: test_file,
            right: downloaded,
            algorithm: HashAlgorithm::Sha256,
            chunk_size: DEFAULT_CHUNK_SIZE,
        },
    }
}

/// Produce records with one key to a fresh topic and read them back
pub fn log(config: &Config) -> Scenario {
    let settings = &config.log;
    let project = config.project_dir(&settings.project);
    let client = project.join("client");
    let topic = Uuid::new_v4().simple().to_string();

    Scenario {
        name: SystemKind::Log.name().to_string(),
        description: Some("Records produced under one key are consumed from one partition".to_string()),
        environment: compose(&project),
        health: endpoints(&settings.ports),
        dependencies: vec![pip_install(&config.tools, &client)],
        vars: BTreeMap::from([("topic".to_string(), topic)]),
        steps: vec![
            Operation::Sleep {
                secs: settings.leader_election_secs as f64,
                reason: Some("leader election".to_string()),
            },
            Operation::Invoke {
                run: python(
                    &config.tools,
                    &client.join("create_topic.py"),
                    [
                        "{topic}".to_string(),
                        "-p".to_string(),
                        settings.partitions.to_string(),
                    ],
                ),
                capture: Some("create_topic".to_string()),
            },
            Operation::Sleep {
                secs: settings.propagation_secs as f64,
                reason: Some("topic propagation".to_string()),
            },
            Operation::Invoke {
                run: python(&config.tools, &client.join("produce.py"), ["{topic}".to_string()])
                    .with_stdin(produce_input(&settings.key, &settings.payloads))
                    .with_timeout(Duration::from_secs(settings.produce_timeout_secs)),
                capture: Some("produce".to_string()),
            },
            Operation::Drain {
                run: ClientInvocation::new(
                    config.tools.python.clone(),
                    [
                        "-u".to_string(),
                        display(&client.join("consume.py")),
                        format!("{{topic}}-{}", settings.consume_partition),
                    ],
                ),
                window_secs: settings.drain_secs as f64,
                capture: Some("consume".to_string()),
            },
        ],
        verify: VerificationRule::Containment {
            capture: "consume".to_string(),
            needles: settings.payloads.clone(),
        },
    }
}

/// Submit a word count job and compare every partition to its snapshot
pub fn job(config: &Config) -> Scenario {
    let settings = &config.job;
    let project = config.project_dir(&settings.project);
    let client = project.join("client");

    Scenario {
        name: SystemKind::Job.name().to_string(),
        description: Some("Word count output matches the golden snapshot".to_string()),
        environment: compose(&project),
        health: endpoints(&settings.ports),
        dependencies: vec![pip_install(&config.tools, &client)],
        vars: BTreeMap::new(),
        steps: vec![
            Operation::Invoke {
                run: python(
                    &config.tools,
                    &client.join("run.py"),
                    [
                        settings.input.clone(),
                        settings.map_tasks.to_string(),
                        settings.reduce_tasks.to_string(),
                        settings.app.clone(),
                    ],
                )
                .with_timeout(Duration::from_secs(settings.timeout_secs)),
                capture: Some("submit".to_string()),
            },
            Operation::Extract {
                from: "submit".to_string(),
                pattern: JOB_ID_PATTERN.to_string(),
                into: "job_id".to_string(),
            },
        ],
        verify: VerificationRule::PartitionSnapshots {
            results_dir: project.join("results").join("{job_id}"),
            partitions: settings.reduce_tasks,
            snapshot_dir: config.paths.snapshots_dir.join(&settings.snapshot),
        },
    }
}

/// Producer stdin: a key line and a payload line per record, then a blank line
pub fn produce_input<S: AsRef<str>>(key: &str, payloads: &[S]) -> String {
    let mut input = String::new();
    for payload in payloads {
        input.push_str(key);
        input.push('\n');
        input.push_str(payload.as_ref());
        input.push('\n');
    }
    input.push('\n');
    input
}

fn compose(project: &Path) -> EnvironmentDescriptor {
    EnvironmentDescriptor::Compose {
        file: project.join("docker-compose.yml"),
        build: true,
    }
}

fn endpoints(ports: &[u16]) -> Vec<HealthEndpoint> {
    ports.iter().copied().map(HealthEndpoint::localhost).collect()
}

fn pip_install(tools: &ToolsConfig, client: &Path) -> ClientInvocation {
    let requirements = client.join("requirements.txt");
    match tools.pip_install.split_first() {
        Some((program, args)) => ClientInvocation::new(
            program.clone(),
            args.iter().cloned().chain([display(&requirements)]),
        ),
        None => ClientInvocation::new("pip", ["install".to_string(), "-r".to_string(), display(&requirements)]),
    }
}

fn python<I: IntoIterator<Item = String>>(tools: &ToolsConfig, script: &Path, args: I) -> ClientInvocation {
    ClientInvocation::new(
        tools.python.clone(),
        std::iter::once(display(script)).chain(args),
    )
}

fn display(path: &Path) -> String {
    path.display().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use crate::scenario::template::{Expand, Vars};

    #[test]
    fn test_produce_input_layout() {
        assert_eq!(
            produce_input("samekey", &["payload1", "payload2", "payload3"]),
            "samekey\npayload1\nsamekey\npayload2\nsamekey\npayload3\n\n"
        );
        assert_eq!(produce_input::<&str>("k", &[]), "\n");
    }

    #[test]
    fn test_storage_scenario_layout() {
        let scenario = storage(&Config::default());
        assert_eq!(scenario.health.len(), 4);
        assert_eq!(scenario.health[0].probe_url(), "http://localhost:8000/healthcheck");
        assert_eq!(
            scenario.dependencies[0].command_line(),
            "pip install -q --progress-bar off -r ./projects/1-hdfs/client/requirements.txt"
        );
        assert_eq!(scenario.steps.len(), 3);
        match &scenario.steps[0] {
            Operation::Invoke { run, .. } => assert_eq!(
                run.command_line(),
                "python3 ./projects/1-hdfs/client/upload.py ./projects/1-hdfs/test_files/cat.jpg uploaded-cat.jpg"
            ),
            other => panic!("Expected Invoke, got {other:?}"),
        }
        assert!(matches!(
            &scenario.verify,
            VerificationRule::HashEquality { chunk_size: 8192, .. }
        ));
    }

    #[test]
    fn test_log_topic_is_fresh_hex() {
        let first = log(&Config::default());
        let second = log(&Config::default());
        let topic = &first.vars["topic"];
        assert_eq!(topic.len(), 32);
        assert!(topic.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(topic, &second.vars["topic"]);
    }

    #[test]
    fn test_log_steps_expand_against_topic() {
        let scenario = log(&Config::default());
        let vars = Vars::new(scenario.vars.clone()).unwrap();
        let topic = scenario.vars["topic"].clone();

        match scenario.steps[4].expand(&vars).unwrap() {
            Operation::Drain {
                run, window_secs, ..
            } => {
                assert_eq!(window_secs, 5.0);
                assert_eq!(run.args.last(), Some(&format!("{}-1", topic)));
                assert_eq!(run.args[0], "-u");
            }
            other => panic!("Expected Drain, got {other:?}"),
        }
        match &scenario.steps[3] {
            Operation::Invoke { run, .. } => {
                assert_eq!(run.timeout_secs, Some(20.0));
                assert!(run.stdin.as_deref().unwrap().ends_with("payload3\n\n"));
            }
            other => panic!("Expected Invoke, got {other:?}"),
        }
    }

    #[test]
    fn test_job_scenario_checks_every_reduce_partition() {
        let scenario = job(&Config::default());
        match &scenario.verify {
            VerificationRule::PartitionSnapshots {
                results_dir,
                partitions,
                snapshot_dir,
            } => {
                assert_eq!(*partitions, 3);
                assert!(results_dir.ends_with("results/{job_id}"));
                assert_eq!(snapshot_dir, &PathBuf::from("./sanity_checks/mapreduce/snapshot"));
            }
            other => panic!("Expected PartitionSnapshots, got {other:?}"),
        }
        match &scenario.steps[0] {
            Operation::Invoke { run, .. } => {
                assert!(run.command_line().ends_with("run.py small-text 1 3 word_count"));
                assert_eq!(run.timeout_secs, Some(100.0));
            }
            other => panic!("Expected Invoke, got {other:?}"),
        }
    }

    #[test]
    fn test_catalog_scenarios_survive_yaml() {
        for kind in [SystemKind::Storage, SystemKind::Log, SystemKind::Job] {
            let scenario = build(kind, &Config::default());
            let yaml = scenario.to_yaml().unwrap();
            assert_eq!(Scenario::from_yaml(&yaml).unwrap(), scenario);
        }
    }
}
