use serde::Serialize;
use tariffsim_core::config::{AppConfig, LoadOptions};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
enum CheckStatus {
    Pass,
    Fail,
    Skipped,
}

#[derive(Debug, Serialize)]
struct DoctorCheck {
    name: &'static str,
    status: CheckStatus,
    details: String,
}

#[derive(Debug, Serialize)]
struct DoctorReport {
    overall_status: CheckStatus,
    summary: String,
    checks: Vec<DoctorCheck>,
}

pub fn run(json_output: bool) -> String {
    let report = build_report();

    if json_output {
        return serde_json::to_string_pretty(&report).unwrap_or_else(|error| {
            format!(
                "{{\"overall_status\":\"fail\",\"summary\":\"doctor serialization failed\",\"error\":\"{}\"}}",
                escape_json(&error.to_string())
            )
        });
    }

    render_human(&report)
}

fn build_report() -> DoctorReport {
    let mut checks = Vec::new();

    match AppConfig::load(LoadOptions::default()) {
        Ok(config) => {
            checks.push(DoctorCheck {
                name: "config_validation",
                status: CheckStatus::Pass,
                details: "configuration loaded and validated".to_string(),
            });
            checks.push(check_transcript_storage(&config));
            checks.push(check_llm_reachability(&config));
        }
        Err(error) => {
            checks.push(DoctorCheck {
                name: "config_validation",
                status: CheckStatus::Fail,
                details: error.to_string(),
            });
            checks.push(DoctorCheck {
                name: "transcript_storage",
                status: CheckStatus::Skipped,
                details: "skipped because configuration did not load".to_string(),
            });
            checks.push(DoctorCheck {
                name: "llm_reachability",
                status: CheckStatus::Skipped,
                details: "skipped because configuration did not load".to_string(),
            });
        }
    }

    let all_pass = checks.iter().all(|check| check.status == CheckStatus::Pass);
    let overall_status = if all_pass { CheckStatus::Pass } else { CheckStatus::Fail };
    let summary = if all_pass {
        "doctor: all readiness checks passed".to_string()
    } else {
        "doctor: one or more readiness checks failed".to_string()
    };

    DoctorReport { overall_status, summary, checks }
}

fn check_transcript_storage(config: &AppConfig) -> DoctorCheck {
    let dir = &config.storage.transcript_dir;
    if let Err(error) = std::fs::create_dir_all(dir) {
        return DoctorCheck {
            name: "transcript_storage",
            status: CheckStatus::Fail,
            details: format!("could not create `{}`: {error}", dir.display()),
        };
    }

    let probe = dir.join(".doctor_probe");
    match std::fs::write(&probe, b"probe") {
        Ok(()) => {
            let _ = std::fs::remove_file(&probe);
            DoctorCheck {
                name: "transcript_storage",
                status: CheckStatus::Pass,
                details: format!("`{}` is writable", dir.display()),
            }
        }
        Err(error) => DoctorCheck {
            name: "transcript_storage",
            status: CheckStatus::Fail,
            details: format!("could not write to `{}`: {error}", dir.display()),
        },
    }
}

fn check_llm_reachability(config: &AppConfig) -> DoctorCheck {
    let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(error) => {
            return DoctorCheck {
                name: "llm_reachability",
                status: CheckStatus::Fail,
                details: format!("failed to initialize async runtime: {error}"),
            };
        }
    };

    let base = config.llm.base_url.trim_end_matches('/');
    let models_url = format!("{base}/v1/models");

    let result = runtime.block_on(async {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(5))
            .build()
            .map_err(|error| format!("failed to build HTTP client: {error}"))?;

        let response = client
            .get(&models_url)
            .send()
            .await
            .map_err(|error| format!("could not reach `{models_url}`: {error}"))?;

        Ok::<reqwest::StatusCode, String>(response.status())
    });

    match result {
        Ok(status) if status.is_success() || status.as_u16() == 401 => DoctorCheck {
            name: "llm_reachability",
            status: CheckStatus::Pass,
            details: format!("`{models_url}` answered with HTTP {status}"),
        },
        Ok(status) => DoctorCheck {
            name: "llm_reachability",
            status: CheckStatus::Fail,
            details: format!("`{models_url}` answered with HTTP {status}"),
        },
        Err(error) => {
            DoctorCheck { name: "llm_reachability", status: CheckStatus::Fail, details: error }
        }
    }
}

fn render_human(report: &DoctorReport) -> String {
    let mut lines = Vec::new();
    lines.push(report.summary.clone());

    for check in &report.checks {
        let marker = match check.status {
            CheckStatus::Pass => "ok",
            CheckStatus::Fail => "fail",
            CheckStatus::Skipped => "skip",
        };
        lines.push(format!("- [{marker}] {}: {}", check.name, check.details));
    }

    lines.join("\n")
}

fn escape_json(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}
