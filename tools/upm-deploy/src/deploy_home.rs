use crate::external_dependencies::DependencySet;
use directories::UserDirs;
use std::{
    ffi::OsStr,
    fs::{self, File},
    hash::{DefaultHasher, Hash, Hasher},
    io::Write,
    path::PathBuf,
};

pub struct DeployHome {
    home_dir: PathBuf,
}

impl DeployHome {
    /// Gets or creates a `.upm-deploy` directory in the users home directory.
    ///
    /// It holds the dependency check cache, the default log file and the
    /// scratch directory for temporary files.
    pub fn new() -> anyhow::Result<Self> {
        let Some(user_dir) = UserDirs::new() else {
            anyhow::bail!("User has no home directory, cannot continue!");
        };

        Self::at(user_dir.home_dir().join(".upm-deploy"))
    }

    pub fn at(home_dir: impl Into<PathBuf>) -> anyhow::Result<Self> {
        let home_dir = home_dir.into();

        if !home_dir.exists() {
            fs::create_dir_all(&home_dir)?;
        }

        Ok(Self { home_dir })
    }

    const DEPENDENCIES_CACHE_FILE_EXTENSION: &str = "cached-deps";

    /// `<command>-<hash>.cached-deps`, so a changed set replaces only its own
    /// earlier cache file.
    fn dependencies_cache_file_path(&self, dependencies: &DependencySet) -> PathBuf {
        let mut hasher = DefaultHasher::new();
        dependencies.hash(&mut hasher);
        let hash = hasher.finish();

        let mut path = self
            .home_dir
            .join(format!("{}-{hash}", dependencies.command));
        path.set_extension(Self::DEPENDENCIES_CACHE_FILE_EXTENSION);

        path
    }

    pub fn cached_dependencies_file_exists(&self, dependencies: &DependencySet) -> bool {
        let path = self.dependencies_cache_file_path(dependencies);
        path.exists()
    }

    pub fn create_cached_dependencies_file(
        &self,
        dependencies: &DependencySet,
    ) -> anyhow::Result<()> {
        let path = self.dependencies_cache_file_path(dependencies);

        // `OsStr::new` is not const so we have to construct it here
        let deps_ext = Some(OsStr::new(Self::DEPENDENCIES_CACHE_FILE_EXTENSION));
        let command_prefix = format!("{}-", dependencies.command);

        fs::read_dir(&self.home_dir)?.for_each(|entry| {
            if let Ok(entry) = entry {
                let entry_path = entry.path();
                let same_command = entry
                    .file_name()
                    .to_string_lossy()
                    .starts_with(&command_prefix);

                if entry_path.extension() == deps_ext && same_command {
                    // Stale cache of an earlier version of this set
                    _ = fs::remove_file(entry_path);
                }
            };
        });

        let mut file = File::create(path)?;

        file.write_all(
            b"This file caches the result of the upm-deploy dependency check and can be ignored\n",
        )?;

        Ok(())
    }

    pub fn default_log_file(&self) -> PathBuf {
        self.home_dir.join("upm-deploy.log")
    }

    /// Scratch space for temporary files, wiped when the process is interrupted.
    pub fn tmp_dir(&self) -> anyhow::Result<PathBuf> {
        let tmp_dir = self.home_dir.join("tmp");

        if !tmp_dir.exists() {
            tracing::debug!("Creating scratch directory {}", tmp_dir.display());
            fs::create_dir(&tmp_dir)?;
        }

        Ok(tmp_dir)
    }
}
