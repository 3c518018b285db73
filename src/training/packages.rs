//! 訓練包
//!
//! 每個訓練包是一份配置副本，以數字編號區分並有各自的隨機種子。
//! 寫入磁碟時每個包佔一個以編號命名的子目錄。

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::config::ApplicationConfig;

/// 訓練包內的配置文件名
pub const PACKAGE_CONFIG_FILE: &str = "net_config.json";

/// 一個待執行的配置變體
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingPackage {
    pub index: usize,
    pub config: ApplicationConfig,
}

/// 複製 `repeat` 份配置，第 `i` 份的隨機種子為 `i`，編號從 1 開始
pub fn generate_variants(config: &ApplicationConfig, repeat: usize) -> Vec<TrainingPackage> {
    (0..repeat)
        .map(|i| {
            let mut variant = config.clone();
            variant.random_seed = i as u64;
            TrainingPackage {
                index: i + 1,
                config: variant,
            }
        })
        .collect()
}

fn package_indices(dir: &Path) -> Result<Vec<usize>> {
    if !dir.exists() {
        return Ok(Vec::new());
    }
    let mut indices = Vec::new();
    for entry in fs::read_dir(dir).with_context(|| format!("無法讀取訓練包目錄 {}", dir.display()))? {
        let entry = entry?;
        if !entry.file_type()?.is_dir() {
            continue;
        }
        match entry.file_name().to_string_lossy().parse::<usize>() {
            Ok(index) => indices.push(index),
            Err(_) => warn!(path = %entry.path().display(), "忽略非數字命名的目錄"),
        }
    }
    indices.sort_unstable();
    Ok(indices)
}

fn package_path(dir: &Path, index: usize) -> PathBuf {
    dir.join(index.to_string())
}

/// 刪除所有已有的訓練包
pub fn clear_packages(dir: &Path) -> Result<()> {
    for index in package_indices(dir)? {
        let path = package_path(dir, index);
        info!(path = %path.display(), "刪除訓練包");
        fs::remove_dir_all(&path).with_context(|| format!("無法刪除 {}", path.display()))?;
    }
    Ok(())
}

/// 在目錄中新增訓練包，編號接在現有最大編號之後
pub fn add_packages(dir: &Path, config: &ApplicationConfig, repeat: usize, replace_existing: bool) -> Result<Vec<usize>> {
    if replace_existing {
        clear_packages(dir)?;
    }
    let offset = package_indices(dir)?.last().copied().unwrap_or(0);

    let mut created = Vec::with_capacity(repeat);
    for mut package in generate_variants(config, repeat) {
        package.index += offset;
        let path = package_path(dir, package.index);
        fs::create_dir_all(&path).with_context(|| format!("無法創建 {}", path.display()))?;

        let json = serde_json::to_string_pretty(&package.config)?;
        fs::write(path.join(PACKAGE_CONFIG_FILE), json)
            .with_context(|| format!("無法寫入 {}", path.display()))?;
        created.push(package.index);
    }

    info!(indices = ?created, "已建立訓練包");
    Ok(created)
}

/// 讀取目錄中的全部訓練包，按編號排序
pub fn load_packages(dir: &Path) -> Result<Vec<TrainingPackage>> {
    let mut packages = Vec::new();
    for index in package_indices(dir)? {
        let file = package_path(dir, index).join(PACKAGE_CONFIG_FILE);
        if !file.exists() {
            warn!(path = %file.display(), "訓練包缺少配置文件");
            continue;
        }
        let content = fs::read_to_string(&file).with_context(|| format!("無法讀取 {}", file.display()))?;
        let config: ApplicationConfig =
            serde_json::from_str(&content).with_context(|| format!("無法解析 {}", file.display()))?;
        packages.push(TrainingPackage { index, config });
    }
    Ok(packages)
}
