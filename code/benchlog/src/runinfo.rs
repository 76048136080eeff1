/// Run information from the side files of a results directory:
///
///  - `stdout.log`, which has the job environment as `KEY=VALUE` lines and the full command line
///    as `# FULLCMD: ... ansible-playbook -i inv --limit=all[0:1000] --forks=20 site.yml`
///  - `proc.cpuinfo.txt` and `proc.meminfo.txt`, copies of the controller's /proc files
///
/// The values are constant over the run and end up as defaults in every row of the timeline.
use crate::event::Value;

use benchutils::{parse_float, parse_int};
use std::collections::BTreeMap;
use ustr::{ustr, Ustr};

// Options of ansible-playbook whose value we want, when given as a separate word.
const VALUE_FLAGS: [&str; 7] = ["-i", "--inventory", "--inventory-file", "-l", "--limit", "-f", "--forks"];

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunInfo {
    pub playbook: Option<String>,
    pub inventory: Option<String>,
    pub hosts: Option<u32>,
    pub forks: Option<u32>,
    pub cpus_total: Option<u32>,
    pub cpus_mhz: Option<f64>,
    pub cpus_model: Option<String>,

    /// KiB
    pub mem_total: Option<i64>,

    pub env: BTreeMap<String, String>,
    pub meminfo: BTreeMap<String, i64>,
}

impl RunInfo {
    pub fn new() -> RunInfo {
        Default::default()
    }

    /// Per-row defaults for the timeline, for the values that are known.

    pub fn defaults(&self) -> Vec<(Ustr, Value)> {
        let mut v = vec![];
        let mut add = |name: &str, x: Option<Value>| {
            if let Some(x) = x {
                v.push((ustr(name), x));
            }
        };
        add("cpus_total", self.cpus_total.map(Value::from));
        add("cpus_mhz", self.cpus_mhz.map(Value::from));
        add("cpus_model", self.cpus_model.as_deref().map(Value::from));
        add("hosts", self.hosts.map(Value::from));
        add("forks", self.forks.map(Value::from));
        add("playbook", self.playbook.as_deref().map(Value::from));
        add("inventory", self.inventory.as_deref().map(Value::from));
        add("mem_total", self.mem_total.map(Value::from));
        v
    }

    pub fn to_json(&self) -> serde_json::Value {
        let mut m = serde_json::Map::new();
        for (k, v) in self.defaults() {
            m.insert(k.to_string(), v.to_json());
        }
        m.insert("env".to_string(), serde_json::json!(self.env));
        m.insert("meminfo".to_string(), serde_json::json!(self.meminfo));
        serde_json::Value::Object(m)
    }

    pub fn read_stdout_log(&mut self, text: &str) {
        for line in text.lines() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            if let Some(comment) = line.strip_prefix('#') {
                if let Some(cmd) = comment.trim().strip_prefix("FULLCMD:") {
                    self.read_command(cmd);
                }
                continue;
            }
            match line.split_once('=') {
                Some((k, v)) => {
                    self.env.insert(k.trim().to_string(), v.trim().to_string());
                }
                None => log::debug!("stdout.log: ignoring '{line}'"),
            }
        }
        if self.hosts.is_none() {
            self.hosts = self.env.get("CONTAINER_COUNT").and_then(|s| s.parse::<u32>().ok());
        }
    }

    fn read_command(&mut self, cmd: &str) {
        let parts = cmd.split_whitespace().filter(|s| *s != "\\").collect::<Vec<&str>>();
        let Some(start) = parts.iter().position(|p| p.ends_with("ansible-playbook")) else {
            log::warn!("stdout.log: no ansible-playbook in command '{cmd}'");
            return;
        };
        let args = &parts[start + 1..];
        self.playbook = args.last().map(|s| s.to_string());
        let mut i = 0;
        while i < args.len() {
            let (flag, inline) = match args[i].split_once('=') {
                Some((f, v)) if f.starts_with('-') => (f, Some(v)),
                _ => (args[i], None),
            };
            let value = || inline.or_else(|| args.get(i + 1).copied());
            match flag {
                "-i" | "--inventory" | "--inventory-file" => {
                    self.inventory = value().map(|s| s.to_string());
                }
                "-l" | "--limit" => {
                    // all[0:1000]
                    self.hosts = value().and_then(|s| {
                        let s = s.trim_matches(|c| c == '"' || c == '\'');
                        s.rsplit(':').next()?.trim_end_matches(']').parse::<u32>().ok()
                    });
                }
                "-f" | "--forks" => {
                    self.forks = value().and_then(|s| s.parse::<u32>().ok());
                }
                _ => {}
            }
            i += if inline.is_none() && VALUE_FLAGS.contains(&flag) { 2 } else { 1 };
        }
    }

    pub fn read_cpuinfo(&mut self, text: &str) {
        let mut processors = 0;
        for line in text.lines() {
            let Some((key, value)) = line.split_once(':') else {
                continue;
            };
            match key.trim() {
                "processor" => processors += 1,
                "model name" => self.cpus_model = Some(value.trim().to_string()),
                "cpu MHz" => self.cpus_mhz = parse_float(value),
                _ => {}
            }
        }
        if processors > 0 {
            self.cpus_total = Some(processors);
        }
    }

    pub fn read_meminfo(&mut self, text: &str) {
        for line in text.lines() {
            let Some((key, value)) = line.split_once(':') else {
                continue;
            };
            let value = value.trim().trim_end_matches("kB");
            if let Some(n) = parse_int(value) {
                self.meminfo.insert(key.trim().to_string(), n);
            }
        }
        self.mem_total = self.meminfo.get("MemTotal").copied();
    }
}

#[test]
fn test_read_stdout_log() {
    let mut info = RunInfo::new();
    info.read_stdout_log(
        "CONTAINER_COUNT=50\n\
         ANSIBLE_SSH_PIPELINING=1\n\
         # FULLCMD:  cgexec -g cpuacct,memory,pids:ansible_profile ansible-playbook -vvvv -i cluster_inventory.yml --limit=all[0:1000] --forks=20 benchmark_1.yml\n",
    );
    assert!(info.playbook.as_deref() == Some("benchmark_1.yml"));
    assert!(info.inventory.as_deref() == Some("cluster_inventory.yml"));
    assert!(info.hosts == Some(1000));
    assert!(info.forks == Some(20));
    assert!(info.env.get("ANSIBLE_SSH_PIPELINING").map(|s| s.as_str()) == Some("1"));

    let mut info = RunInfo::new();
    info.read_stdout_log("CONTAINER_COUNT=50\n# FULLCMD: ansible-playbook -f 5 site.yml\n");
    assert!(info.hosts == Some(50));
    assert!(info.forks == Some(5));
    assert!(info.inventory.is_none());
}

#[test]
fn test_read_proc_files() {
    let mut info = RunInfo::new();
    info.read_cpuinfo(
        "processor\t: 0\nmodel name\t: Intel(R) Xeon(R) CPU E5-2680 v3 @ 2.50GHz\ncpu MHz\t\t: 2494.224\n\n\
         processor\t: 1\nmodel name\t: Intel(R) Xeon(R) CPU E5-2680 v3 @ 2.50GHz\ncpu MHz\t\t: 2494.224\n",
    );
    info.read_meminfo("MemTotal:        1882220 kB\nMemFree:         1513532 kB\nHugePages_Total:       0\n");
    assert!(info.cpus_total == Some(2));
    assert!(info.cpus_mhz == Some(2494.224));
    assert!(info.mem_total == Some(1882220));
    assert!(info.meminfo.get("HugePages_Total") == Some(&0));

    let defaults = info.defaults();
    assert!(defaults.len() == 4);
    assert!(defaults[0] == (ustr("cpus_total"), Value::Int(2)));
    assert!(info.to_json()["mem_total"] == serde_json::json!(1882220));
}
