use crate::error::SamplingError;
use crate::signals::Subject;
use log::{debug, error};
use std::io::Write;
use std::process::{Command, Output, Stdio};

/// Matches the subject's pid namespace against every running container
const FIND_CONTAINER_SCRIPT: &str = r#"
container_pid=__PID__
container_pid_ns=$(lsns -no NS -t pid -p "${container_pid}")
found=false
for UUID in $(docker ps -q); do
 pid=$(docker inspect -f '{{.State.Pid}}' "$UUID")
 name=$(docker inspect -f '{{.Name}}' "$UUID")
 name=${name#/}

 pidns=$(stat --format="%N" /proc/"${pid}"/ns/pid)
 pidns=${pidns#*[}
 pidns=${pidns%]*}

 if [[ "${container_pid_ns}" -eq "${pidns}" ]]; then
   echo "${name}"
   found=true
   break
 fi
done

if ! $found; then
 >&2 echo "unable to find container for pid: ${container_pid}"
 exit 1
fi
"#;

/// Render the lookup script for one subject
pub fn render_script(subject: Subject) -> String {
    FIND_CONTAINER_SCRIPT.replace("__PID__", &subject.to_string())
}

/// Name of the docker container the subject runs in
///
/// Pipes the lookup script to `bash -s`. Fails if no container shares the
/// subject's pid namespace.
pub fn find_container_name(subject: Subject) -> Result<String, SamplingError> {
    debug!("[pid {}] attempting to find container name", subject);

    let output = pipe_script("bash", &["-s"], &render_script(subject))?;
    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        error!("[pid {}] failed to get container name: {}", subject, stderr);
        return Err(SamplingError::Command(stderr));
    }

    let name = String::from_utf8_lossy(&output.stdout).trim_end().to_string();
    if name.is_empty() {
        return Err(SamplingError::Parse(format!(
            "empty container name for pid {}",
            subject
        )));
    }
    Ok(name)
}

/// Feed `script` to the program's stdin and collect its output
///
/// The child is always waited on, even when writing the script fails.
fn pipe_script(program: &str, args: &[&str], script: &str) -> Result<Output, SamplingError> {
    let mut child = Command::new(program)
        .args(args)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| SamplingError::Command(format!("{}: {}", program, e)))?;

    // stdin is dropped at the end of the arm so the child sees EOF
    let written = match child.stdin.take() {
        Some(mut stdin) => stdin.write_all(script.as_bytes()),
        None => Ok(()),
    };
    let output = child.wait_with_output()?;
    written?;
    Ok(output)
}
