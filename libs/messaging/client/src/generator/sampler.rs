//! Host resource sampling
//!
//! [`ResourceSource`] abstracts where samples come from so the resource
//! generator can be driven by canned data in tests. [`SystemResourceSource`]
//! reads the local host through `sysinfo`.

use std::collections::VecDeque;
use std::fmt;
use sysinfo::{Disks, Networks, System};
use types::{Field, Message, TypesResult};

/// One point-in-time reading of host resources
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ResourceSample {
    pub num_cpus: u16,
    /// Percent, 0-100
    pub cpu_util: f32,
    pub mem_total: u64,
    pub mem_util: f32,
    pub swap_total: u64,
    pub swap_util: f32,
    pub num_disks: u16,
    pub disk_total: u64,
    pub disk_available: u64,
    pub num_net_ports: u16,
    pub net_bytes_received: u64,
    pub net_bytes_sent: u64,
}

pub trait ResourceSource: Send + fmt::Debug + 'static {
    /// Operating system description for OPER-SYS
    fn os_version(&self) -> String;

    fn sample(&mut self) -> ResourceSample;
}

pub struct SystemResourceSource {
    system: System,
    disks: Disks,
    networks: Networks,
}

impl SystemResourceSource {
    pub fn new() -> Self {
        let mut system = System::new();
        system.refresh_cpu();
        system.refresh_memory();
        Self {
            system,
            disks: Disks::new_with_refreshed_list(),
            networks: Networks::new_with_refreshed_list(),
        }
    }
}

impl Default for SystemResourceSource {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for SystemResourceSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SystemResourceSource")
            .field("cpus", &self.system.cpus().len())
            .field("disks", &self.disks.list().len())
            .finish()
    }
}

impl ResourceSource for SystemResourceSource {
    fn os_version(&self) -> String {
        System::long_os_version()
            .or_else(System::name)
            .unwrap_or_else(|| std::env::consts::OS.to_string())
    }

    fn sample(&mut self) -> ResourceSample {
        self.system.refresh_cpu();
        self.system.refresh_memory();
        self.disks.refresh();
        self.networks.refresh();

        let (disk_total, disk_available) = self
            .disks
            .list()
            .iter()
            .fold((0u64, 0u64), |(total, available), disk| {
                (total + disk.total_space(), available + disk.available_space())
            });

        let mut net_bytes_received = 0u64;
        let mut net_bytes_sent = 0u64;
        let mut num_net_ports = 0usize;
        for (_interface, data) in &self.networks {
            net_bytes_received += data.total_received();
            net_bytes_sent += data.total_transmitted();
            num_net_ports += 1;
        }

        ResourceSample {
            num_cpus: saturate(self.system.cpus().len()),
            cpu_util: self.system.global_cpu_info().cpu_usage(),
            mem_total: self.system.total_memory(),
            mem_util: percent(self.system.used_memory(), self.system.total_memory()),
            swap_total: self.system.total_swap(),
            swap_util: percent(self.system.used_swap(), self.system.total_swap()),
            num_disks: saturate(self.disks.list().len()),
            disk_total,
            disk_available,
            num_net_ports: saturate(num_net_ports),
            net_bytes_received,
            net_bytes_sent,
        }
    }
}

fn percent(used: u64, total: u64) -> f32 {
    if total == 0 {
        0.0
    } else {
        (used as f64 / total as f64 * 100.0) as f32
    }
}

fn saturate(count: usize) -> u16 {
    u16::try_from(count).unwrap_or(u16::MAX)
}

/// Minimum, maximum and mean over the window
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WindowStats {
    pub min: f32,
    pub max: f32,
    pub avg: f32,
}

/// Moving window of the most recent samples
#[derive(Debug, Clone)]
pub struct SampleWindow {
    capacity: usize,
    samples: VecDeque<ResourceSample>,
}

impl SampleWindow {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            samples: VecDeque::with_capacity(capacity),
        }
    }

    pub fn push(&mut self, sample: ResourceSample) {
        if self.samples.len() == self.capacity {
            self.samples.pop_front();
        }
        self.samples.push_back(sample);
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn latest(&self) -> Option<&ResourceSample> {
        self.samples.back()
    }

    pub fn stats(&self, metric: impl Fn(&ResourceSample) -> f32) -> Option<WindowStats> {
        let mut values = self.samples.iter().map(metric);
        let first = values.next()?;
        let (min, max, sum, count) = values.fold((first, first, first as f64, 1u32), |acc, v| {
            (acc.0.min(v), acc.1.max(v), acc.2 + v as f64, acc.3 + 1)
        });
        Some(WindowStats {
            min,
            max,
            avg: (sum / f64::from(count)) as f32,
        })
    }

    /// Write the latest sample and window statistics onto `message`
    pub fn apply_to(&self, message: &mut Message) -> TypesResult<()> {
        let Some(latest) = self.latest() else {
            return Ok(());
        };

        message.add_field(Field::new("NUM-CPUS", latest.num_cpus)?);
        message.add_field(Field::new("MEM-PHYS-TOTAL", latest.mem_total)?);
        message.add_field(Field::new("MEM-VIRT-TOTAL", latest.swap_total)?);
        message.add_field(Field::new("NUM-DISKS", latest.num_disks)?);
        message.add_field(Field::new("DISK-TOTAL", latest.disk_total)?);
        message.add_field(Field::new("DISK-AVAIL", latest.disk_available)?);
        message.add_field(Field::new("NUM-NET-PORTS", latest.num_net_ports)?);
        message.add_field(Field::new("NET-BYTES-RECV", latest.net_bytes_received)?);
        message.add_field(Field::new("NET-BYTES-SENT", latest.net_bytes_sent)?);
        message.add_field(Field::new("SAMPLE-COUNT", saturate(self.len()))?);

        let metrics: [(&str, fn(&ResourceSample) -> f32); 3] = [
            ("CPU-UTIL", |s| s.cpu_util),
            ("MEM-PHYS-UTIL", |s| s.mem_util),
            ("MEM-VIRT-UTIL", |s| s.swap_util),
        ];
        for (name, metric) in metrics {
            message.add_field(Field::new(name, metric(latest))?);
            if let Some(stats) = self.stats(metric) {
                message.add_field(Field::new(format!("{name}-MIN"), stats.min)?);
                message.add_field(Field::new(format!("{name}-MAX"), stats.max)?);
                message.add_field(Field::new(format!("{name}-AVG"), stats.avg)?);
            }
        }
        Ok(())
    }
}
