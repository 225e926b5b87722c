use fleetcap_schemas::capture_config::{BucketConfig, CaptureSettings, ServiceSelector, Uploader};
use crate::target::{Target, TargetKind};

/// Name of a target's capture, both on the target and in the bucket
pub fn object_key(target_id: &str) -> String {
    format!("tcpdump_{target_id}.pcap")
}

/// The capture file a target writes, named after the target so that every object in the shared
/// bucket is distinct.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureFile {
    dir: String,
    target_id: String,
}

impl CaptureFile {
    pub fn new(dir: &str, target_id: &str) -> Self {
        Self { dir: dir.to_string(), target_id: target_id.to_string() }
    }

    pub fn object_key(&self) -> String {
        object_key(&self.target_id)
    }

    pub fn remote_path(&self) -> String {
        format!("{}/{}", self.dir.trim_end_matches('/'), self.object_key())
    }

    /// Holds the pid of the tcpdump writing this file, so the stop step can signal exactly that
    /// process
    pub fn pid_path(&self) -> String {
        format!("{}.pid", self.remote_path())
    }
}

/// Everything we ever run on a target. Values stay typed until `render`, which is the only place
/// a shell string is built, and every interpolated value is quoted there.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteCommand {
    StartCapture {
        file: CaptureFile,
        interface: String,
        filter: String,
        sudo: bool,
    },
    StopAndStage {
        file: CaptureFile,
        sudo: bool,
        uploader: Uploader,
        bucket: String,
    },
}

impl RemoteCommand {
    pub fn name(&self) -> &'static str {
        match self {
            RemoteCommand::StartCapture { .. } => "start capture",
            RemoteCommand::StopAndStage { .. } => "stop and stage",
        }
    }

    pub fn render(&self) -> String {
        match self {
            RemoteCommand::StartCapture { file, interface, filter, sudo } => {
                let mut argv = Vec::new();
                if *sudo {
                    argv.push("sudo".to_string());
                }
                argv.extend(["nohup", "tcpdump", "-i", interface.as_str(), "-U", "-s0", "-w"].map(String::from));
                argv.push(file.remote_path());
                if !filter.trim().is_empty() {
                    argv.push(filter.clone());
                }
                // background it, then fail the launch if tcpdump died straight away
                format!(
                    "{} >/dev/null 2>&1 & echo $! > {}; sleep 1; kill -0 $!",
                    shell_words::join(&argv),
                    shell_words::quote(&file.pid_path()),
                )
            }
            RemoteCommand::StopAndStage { file, sudo, uploader, bucket } => {
                let path = file.remote_path();
                let pid_path = shell_words::quote(&file.pid_path()).into_owned();
                let sudo_prefix = if *sudo { "sudo " } else { "" };

                let upload = match uploader {
                    Uploader::AwsCli { sudo } => {
                        let mut argv = Vec::new();
                        if *sudo {
                            argv.push("sudo".to_string());
                        }
                        argv.extend(["aws", "s3", "cp"].map(String::from));
                        argv.push(path.clone());
                        argv.push(format!("s3://{}/{}", bucket, file.object_key()));
                        argv
                    }
                    Uploader::NodeScript { node, script } => {
                        vec![node.clone(), script.clone(), path.clone(), bucket.clone()]
                    }
                };
                // signal by pid, a pattern match on the file name would also hit the shell
                // running this script. The exit status is the upload's, a capture that already
                // ended is fine as long as the file is there to upload.
                format!(
                    "{sudo_prefix}kill -INT \"$(cat {pid_path})\"; {sudo_prefix}rm -f {pid_path}; sleep 2; {}",
                    shell_words::join(&upload),
                )
            }
        }
    }
}

/// Builds the remote commands for one service. Capture location and privilege depend on the
/// target kind, containers run as root and instances go through sudo.
#[derive(Debug, Clone)]
pub struct CaptureCommands {
    settings: CaptureSettings,
    uploader: Option<Uploader>,
    bucket: String,
}

impl CaptureCommands {
    pub fn new(settings: &CaptureSettings, selector: &ServiceSelector, bucket: &BucketConfig) -> Self {
        Self {
            settings: settings.clone(),
            uploader: selector.uploader.clone(),
            bucket: bucket.name.clone(),
        }
    }

    pub fn capture_file(&self, target: &Target) -> CaptureFile {
        let dir = match target.kind {
            TargetKind::Task => &self.settings.task_capture_dir,
            TargetKind::Instance => &self.settings.instance_capture_dir,
        };
        CaptureFile::new(dir, &target.id)
    }

    pub fn start_capture(&self, target: &Target) -> RemoteCommand {
        RemoteCommand::StartCapture {
            file: self.capture_file(target),
            interface: self.settings.interface.clone(),
            filter: self.settings.capture_filter.clone(),
            sudo: target.kind == TargetKind::Instance,
        }
    }

    pub fn stop_and_stage(&self, target: &Target) -> RemoteCommand {
        RemoteCommand::StopAndStage {
            file: self.capture_file(target),
            sudo: target.kind == TargetKind::Instance,
            uploader: self.uploader.clone().unwrap_or_else(|| self.settings.default_uploader(target.kind)),
            bucket: self.bucket.clone(),
        }
    }

    /// Where the stop and stage command leaves the capture
    pub fn staged_path(&self, target: &Target) -> String {
        format!("s3://{}/{}", self.bucket, self.capture_file(target).object_key())
    }
}

#[cfg(test)]
mod tests {
    use crate::target::NetworkAddresses;
    use crate::test_support::selector;
    use super::*;

    fn commands(uploader: Option<Uploader>) -> CaptureCommands {
        let mut selector = selector(TargetKind::Task, "sbc");
        selector.uploader = uploader;
        CaptureCommands::new(
            &CaptureSettings::default(),
            &selector,
            &BucketConfig { name: "pcaps-lab".into(), region: "us-east-1".into() },
        )
    }

    fn task(id: &str) -> Target {
        Target::task(id, "sbc", "us-east-1", NetworkAddresses::not_available())
    }

    fn instance(id: &str) -> Target {
        Target::instance(id, "sbc-edge", "us-east-1", NetworkAddresses::not_available(), None)
    }

    #[test]
    fn test_capture_file_names() {
        let file = CaptureFile::new("/home/ec2-user/", "i-123");
        assert_eq!(file.object_key(), "tcpdump_i-123.pcap");
        assert_eq!(file.remote_path(), "/home/ec2-user/tcpdump_i-123.pcap");
    }

    #[test]
    fn test_start_capture_on_task() {
        let cmd = commands(None).start_capture(&task("abc123"));
        assert_eq!(cmd.name(), "start capture");
        assert_eq!(
            cmd.render(),
            "nohup tcpdump -i any -U -s0 -w ./pcapScript/tcpdump_abc123.pcap 'not port 22' >/dev/null 2>&1 \
             & echo $! > ./pcapScript/tcpdump_abc123.pcap.pid; sleep 1; kill -0 $!"
        );
    }

    #[test]
    fn test_start_capture_on_instance_uses_sudo() {
        let cmd = commands(None).start_capture(&instance("i-1"));
        assert!(cmd.render().starts_with("sudo nohup tcpdump -i any -U -s0 -w /home/ec2-user/tcpdump_i-1.pcap "));
    }

    #[test]
    fn test_stop_and_stage_default_uploaders() {
        let c = commands(None);
        assert_eq!(
            c.stop_and_stage(&instance("i-1")).render(),
            "sudo kill -INT \"$(cat /home/ec2-user/tcpdump_i-1.pcap.pid)\"; \
             sudo rm -f /home/ec2-user/tcpdump_i-1.pcap.pid; sleep 2; \
             sudo aws s3 cp /home/ec2-user/tcpdump_i-1.pcap s3://pcaps-lab/tcpdump_i-1.pcap"
        );
        assert_eq!(
            c.stop_and_stage(&task("t1")).render(),
            "kill -INT \"$(cat ./pcapScript/tcpdump_t1.pcap.pid)\"; \
             rm -f ./pcapScript/tcpdump_t1.pcap.pid; sleep 2; \
             /root/.nvm/versions/node/v16.19.0/bin/node ./pcapScript/savePcap.js ./pcapScript/tcpdump_t1.pcap pcaps-lab"
        );
        assert_eq!(c.staged_path(&task("t1")), "s3://pcaps-lab/tcpdump_t1.pcap");
    }

    #[test]
    fn test_service_uploader_overrides_default() {
        let c = commands(Some(Uploader::AwsCli { sudo: false }));
        assert!(c.stop_and_stage(&task("t1")).render().ends_with("; aws s3 cp ./pcapScript/tcpdump_t1.pcap s3://pcaps-lab/tcpdump_t1.pcap"));
    }

    #[tokio::test]
    async fn test_stop_and_stage_runs_the_upload() {
        use std::os::unix::process::ExitStatusExt;
        use tokio::process::Command;

        let dir = tempfile::tempdir().unwrap();
        let file = CaptureFile::new(dir.path().to_str().unwrap(), "t1");
        // a process whose command line names the capture file, as the shell running the script does
        let mut bystander = Command::new("sh")
            .arg("-c")
            .arg(format!("sleep 30 # {}", file.remote_path()))
            .kill_on_drop(true)
            .spawn()
            .unwrap();
        let mut capture = Command::new("sleep").arg("30").kill_on_drop(true).spawn().unwrap();
        std::fs::write(file.pid_path(), format!("{}\n", capture.id().unwrap())).unwrap();

        let cmd = RemoteCommand::StopAndStage {
            file: file.clone(),
            sudo: false,
            uploader: Uploader::NodeScript { node: "echo".into(), script: "UPLOADED".into() },
            bucket: "pcaps-lab".into(),
        };
        let out = Command::new("/bin/sh").arg("-c").arg(cmd.render()).output().await.unwrap();
        assert!(out.status.success(), "{:?}", out);
        assert_eq!(
            String::from_utf8_lossy(&out.stdout).trim(),
            format!("UPLOADED {} pcaps-lab", file.remote_path())
        );

        let status = capture.wait().await.unwrap();
        assert_eq!(status.signal(), Some(2));
        assert!(bystander.try_wait().unwrap().is_none());
        assert!(!std::path::Path::new(&file.pid_path()).exists());
    }

    #[test]
    fn test_hostile_values_are_quoted() {
        let cmd = RemoteCommand::StartCapture {
            file: CaptureFile::new("/tmp", "x; rm -rf /"),
            interface: "eth0".into(),
            filter: "host 1.2.3.4 && port '5060'".into(),
            sudo: false,
        };
        let rendered = cmd.render();
        assert!(rendered.contains("'/tmp/tcpdump_x; rm -rf /.pcap'"));
        // parsing the command part back gives the original values as single words
        let words = shell_words::split(rendered.split(" >/dev/null").next().unwrap()).unwrap();
        assert_eq!(words.last().unwrap(), "host 1.2.3.4 && port '5060'");
        assert_eq!(words[words.len() - 2], "/tmp/tcpdump_x; rm -rf /.pcap");
    }
}
