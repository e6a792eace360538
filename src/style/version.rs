use std::process::Stdio;

/// Version tag for minified artifacts: the command's stdout with all
/// whitespace removed, or `fallback` if the command can't produce one.
pub async fn describe(command: &[String], fallback: &str) -> String {
    let Some((program, args)) = command.split_first() else {
        return fallback.to_string();
    };

    let output = tokio::process::Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stderr(Stdio::null())
        .output()
        .await;

    match output {
        Ok(out) if out.status.success() => {
            let tag = sanitize(&String::from_utf8_lossy(&out.stdout));
            if tag.is_empty() {
                fallback.to_string()
            } else {
                tag
            }
        }
        Ok(out) => {
            tracing::debug!(status = %out.status, "version command failed, using fallback");
            fallback.to_string()
        }
        Err(e) => {
            tracing::debug!(error = %e, "version command unavailable, using fallback");
            fallback.to_string()
        }
    }
}

pub fn sanitize(raw: &str) -> String {
    raw.chars().filter(|c| !c.is_whitespace()).collect()
}
