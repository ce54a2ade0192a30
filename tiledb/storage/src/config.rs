/// The resource bounds and tuning knobs §5 names inline throughout the
/// prose, collected here the way the teacher's `Config` gathers scattered
/// tunables into one builder-constructed value instead of bare constants
/// sprinkled through the call sites.
#[derive(Clone, Debug)]
pub struct Config {
    max_open_arrays: usize,
    write_state_max_size: usize,
    io_segment_size: usize,
    initial_var_cell_buffer: usize,
    gzip_suffix: String,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            max_open_arrays: 100,
            write_state_max_size: 1 << 30,
            io_segment_size: 10 * 1024 * 1024,
            initial_var_cell_buffer: 4096,
            gzip_suffix: ".gz".to_string(),
        }
    }
}

impl Config {
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder(Config::default())
    }

    pub fn max_open_arrays(&self) -> usize {
        self.max_open_arrays
    }

    pub fn write_state_max_size(&self) -> usize {
        self.write_state_max_size
    }

    pub fn io_segment_size(&self) -> usize {
        self.io_segment_size
    }

    pub fn initial_var_cell_buffer(&self) -> usize {
        self.initial_var_cell_buffer
    }

    pub fn gzip_suffix(&self) -> &str {
        &self.gzip_suffix
    }
}

pub struct ConfigBuilder(Config);

impl ConfigBuilder {
    pub fn max_open_arrays(mut self, n: usize) -> Self {
        self.0.max_open_arrays = n;
        self
    }

    pub fn write_state_max_size(mut self, n: usize) -> Self {
        self.0.write_state_max_size = n;
        self
    }

    pub fn io_segment_size(mut self, n: usize) -> Self {
        self.0.io_segment_size = n;
        self
    }

    pub fn initial_var_cell_buffer(mut self, n: usize) -> Self {
        self.0.initial_var_cell_buffer = n;
        self
    }

    pub fn gzip_suffix(mut self, s: impl Into<String>) -> Self {
        self.0.gzip_suffix = s.into();
        self
    }

    pub fn build(self) -> Config {
        self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_matches_spec_bounds() {
        let cfg = Config::default();
        assert_eq!(cfg.max_open_arrays(), 100);
        assert_eq!(cfg.write_state_max_size(), 1 << 30);
        assert_eq!(cfg.io_segment_size(), 10 * 1024 * 1024);
        assert_eq!(cfg.initial_var_cell_buffer(), 4096);
    }

    #[test]
    fn builder_overrides_fields() {
        let cfg = Config::builder().max_open_arrays(4).build();
        assert_eq!(cfg.max_open_arrays(), 4);
        assert_eq!(cfg.write_state_max_size(), 1 << 30);
    }
}
