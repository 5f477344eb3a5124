// ============================================================================
// 技术栈分析服务：清单解析、内容特征匹配、项目类型分类
// ✅ 只能做：文件遍历、package.json 解析、固定子串匹配
// ⛔ 禁止：依赖 tauri::*，编译正则模式
// ============================================================================

use crate::models::dtos::{AnalysisReport, SkipEvent};
use crate::services::is_ignored_dir;
use crate::utils::error::{AppError, AppResult};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::Path;
use walkdir::WalkDir;

/// 检出信号的归属集合
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalTarget {
    /// 写入 frameworks 集合
    Framework,
    /// 写入 technologies 集合
    Technology,
}

/// 清单检测规则：package.json 依赖名 → 标签
struct ManifestRule {
    /// 匹配的包名（任意一个命中即算检出）
    packages: &'static [&'static str],
    /// 检出后登记的标签
    label: &'static str,
    /// 标签归属集合
    target: SignalTarget,
    /// 是否把清单声明的版本号记入 dependency_versions
    record_version: bool,
}

/// 内容检测规则：文件内容固定子串 → 标签（大小写敏感，不做模式编译）
struct ContentRule {
    /// 任意一个子串命中即算检出
    needles: &'static [&'static str],
    /// 检出后登记的标签
    label: &'static str,
    /// 标签归属集合
    target: SignalTarget,
}

/// 清单检测规则表（检查顺序即报告中的登记顺序）
const MANIFEST_RULES: &[ManifestRule] = &[
    ManifestRule {
        packages: &["react"],
        label: "React",
        target: SignalTarget::Framework,
        record_version: true,
    },
    ManifestRule {
        packages: &["vue"],
        label: "Vue.js",
        target: SignalTarget::Framework,
        record_version: true,
    },
    ManifestRule {
        packages: &["@angular/core"],
        label: "Angular",
        target: SignalTarget::Framework,
        record_version: true,
    },
    ManifestRule {
        packages: &["svelte"],
        label: "Svelte",
        target: SignalTarget::Framework,
        record_version: true,
    },
    ManifestRule {
        packages: &["next"],
        label: "Next.js",
        target: SignalTarget::Framework,
        record_version: true,
    },
    ManifestRule {
        packages: &["nuxt"],
        label: "Nuxt.js",
        target: SignalTarget::Framework,
        record_version: true,
    },
    ManifestRule {
        packages: &["jquery"],
        label: "jQuery",
        target: SignalTarget::Framework,
        record_version: true,
    },
    ManifestRule {
        packages: &["bootstrap"],
        label: "Bootstrap",
        target: SignalTarget::Technology,
        record_version: false,
    },
    ManifestRule {
        packages: &["tailwindcss", "tailwind"],
        label: "Tailwind CSS",
        target: SignalTarget::Technology,
        record_version: false,
    },
    ManifestRule {
        packages: &["typescript"],
        label: "TypeScript",
        target: SignalTarget::Technology,
        record_version: true,
    },
    ManifestRule {
        packages: &["webpack"],
        label: "Webpack",
        target: SignalTarget::Technology,
        record_version: false,
    },
    ManifestRule {
        packages: &["@babel/core", "babel"],
        label: "Babel",
        target: SignalTarget::Technology,
        record_version: false,
    },
];

/// HTML 内容检测规则表（CDN 引用特征）
const MARKUP_RULES: &[ContentRule] = &[
    ContentRule {
        needles: &["unpkg.com/react", "cdnjs.cloudflare.com/ajax/libs/react"],
        label: "React",
        target: SignalTarget::Framework,
    },
    ContentRule {
        needles: &["unpkg.com/vue", "cdnjs.cloudflare.com/ajax/libs/vue"],
        label: "Vue.js",
        target: SignalTarget::Framework,
    },
    ContentRule {
        needles: &["unpkg.com/@angular", "cdnjs.cloudflare.com/ajax/libs/angular"],
        label: "Angular",
        target: SignalTarget::Framework,
    },
    ContentRule {
        needles: &["code.jquery.com", "cdnjs.cloudflare.com/ajax/libs/jquery"],
        label: "jQuery",
        target: SignalTarget::Framework,
    },
    ContentRule {
        needles: &["unpkg.com/svelte", "@sveltejs"],
        label: "Svelte",
        target: SignalTarget::Framework,
    },
    ContentRule {
        needles: &["bootstrap.min.css", "bootstrap.css"],
        label: "Bootstrap",
        target: SignalTarget::Technology,
    },
    ContentRule {
        needles: &["tailwindcss"],
        label: "Tailwind CSS",
        target: SignalTarget::Technology,
    },
];

/// 脚本内容检测规则表（import/使用特征）
const SCRIPT_RULES: &[ContentRule] = &[
    ContentRule {
        needles: &[
            "import React",
            "from \"react\"",
            "from 'react'",
            "require(\"react\")",
            "ReactDOM",
        ],
        label: "React",
        target: SignalTarget::Framework,
    },
    ContentRule {
        needles: &["from \"vue\"", "from 'vue'", "Vue.component", "new Vue("],
        label: "Vue.js",
        target: SignalTarget::Framework,
    },
    ContentRule {
        needles: &["@angular/", "NgModule"],
        label: "Angular",
        target: SignalTarget::Framework,
    },
    ContentRule {
        needles: &["jQuery(", "require(\"jquery\")", "$(document)"],
        label: "jQuery",
        target: SignalTarget::Framework,
    },
    ContentRule {
        needles: &["svelte/", "@sveltejs"],
        label: "Svelte",
        target: SignalTarget::Framework,
    },
];

/// 单次分析的完整产出：报告 + 跳过记录
#[derive(Debug, Clone)]
pub struct Analysis {
    /// 技术栈分析报告
    pub report: AnalysisReport,
    /// 分析过程中跳过的文件（不可读内容、损坏清单）
    pub skipped: Vec<SkipEvent>,
}

/// 单次分析的累积状态
#[derive(Default)]
struct Detection {
    frameworks: Vec<String>,
    technologies: Vec<String>,
    dependency_versions: BTreeMap<String, String>,
    skipped: Vec<SkipEvent>,
}

impl Detection {
    /// 登记一个检出标签，跨集合去重：已存在于任一集合的名称不再插入
    fn register(&mut self, target: SignalTarget, label: &str) {
        let seen = self.frameworks.iter().any(|f| f == label)
            || self.technologies.iter().any(|t| t == label);
        if seen {
            return;
        }
        match target {
            SignalTarget::Framework => self.frameworks.push(label.to_string()),
            SignalTarget::Technology => self.technologies.push(label.to_string()),
        }
    }

    /// 记录一次文件跳过
    fn skip(&mut self, path: String, reason: String) {
        self.skipped.push(SkipEvent { path, reason });
    }
}

/// 分析项目目录的技术栈
///
/// 三类检测依次执行：根目录清单解析、内容子串匹配（HTML 与脚本文件）、
/// 样式文件扩展名识别。遍历按文件名排序，同一目录内容的两次分析产出
/// 逐字节一致的报告。
///
/// # 参数
/// - `root`: 项目根目录
///
/// # 返回
/// - `Ok(Analysis)`: 报告与跳过记录
/// - `Err(AppError::InvalidFolder)`: 根目录不存在或不是目录
pub fn analyze_project(root: &Path) -> AppResult<Analysis> {
    if !root.is_dir() {
        return Err(AppError::InvalidFolder(format!(
            "项目目录不存在：{}",
            root.display()
        )));
    }

    let mut det = Detection::default();

    // 1. 清单检测：仅根目录的 package.json
    analyze_manifest(root, &mut det);

    // 2. 内容检测：排序遍历，忽略目录在任意深度都不进入
    for entry in WalkDir::new(root)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| !is_ignored_dir(e))
    {
        let entry = match entry {
            Ok(e) => e,
            Err(e) => {
                let path = e
                    .path()
                    .map(|p| relative_path(root, p))
                    .unwrap_or_default();
                det.skip(path, format!("遍历条目失败：{}", e));
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }

        let ext = entry
            .path()
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("")
            .to_string();

        match ext.as_str() {
            "html" => apply_content_rules(root, entry.path(), MARKUP_RULES, &mut det),
            "js" | "jsx" | "ts" | "tsx" => {
                // 类型系统信号来自扩展名本身，与内容无关
                if ext == "ts" || ext == "tsx" {
                    det.register(SignalTarget::Technology, "TypeScript");
                }
                apply_content_rules(root, entry.path(), SCRIPT_RULES, &mut det);
            }
            "scss" | "sass" => det.register(SignalTarget::Technology, "SASS"),
            "less" => det.register(SignalTarget::Technology, "Less"),
            _ => {}
        }
    }

    // 3. 分类：纯粹由框架集合决定
    let project_type = classify_project_type(&det.frameworks);

    Ok(Analysis {
        report: AnalysisReport {
            frameworks: det.frameworks,
            technologies: det.technologies,
            dependency_versions: det.dependency_versions,
            project_type,
        },
        skipped: det.skipped,
    })
}

/// 解析根目录 package.json 并应用清单规则
///
/// dependencies 与 devDependencies 合并查询（版本号以 devDependencies 优先）。
/// 清单缺失不算异常；清单损坏记一次跳过后按无清单处理。
fn analyze_manifest(root: &Path, det: &mut Detection) {
    let manifest_path = root.join("package.json");
    if !manifest_path.is_file() {
        return;
    }

    let content = match std::fs::read_to_string(&manifest_path) {
        Ok(c) => c,
        Err(e) => {
            det.skip("package.json".to_string(), format!("读取清单失败：{}", e));
            return;
        }
    };

    let json: Value = match serde_json::from_str(&content) {
        Ok(v) => v,
        Err(e) => {
            det.skip(
                "package.json".to_string(),
                format!("清单 JSON 解析失败：{}", e),
            );
            return;
        }
    };

    let deps = json.get("dependencies").and_then(Value::as_object);
    let dev_deps = json.get("devDependencies").and_then(Value::as_object);
    let lookup = |package: &str| {
        dev_deps
            .and_then(|m| m.get(package))
            .or_else(|| deps.and_then(|m| m.get(package)))
    };

    for rule in MANIFEST_RULES {
        let hit = rule.packages.iter().find_map(|pkg| lookup(pkg));
        if let Some(version) = hit {
            det.register(rule.target, rule.label);
            if rule.record_version {
                // 清单里的版本通常是字符串，其它 JSON 类型记为 unknown
                let version_text = version.as_str().unwrap_or("unknown").to_string();
                det.dependency_versions
                    .insert(rule.label.to_string(), version_text);
            }
        }
    }
}

/// 读取单个文件并应用一张内容规则表，读取失败记为跳过
fn apply_content_rules(root: &Path, path: &Path, rules: &[ContentRule], det: &mut Detection) {
    let content = match std::fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) => {
            det.skip(relative_path(root, path), format!("读取文件失败：{}", e));
            return;
        }
    };

    for rule in rules {
        if rule.needles.iter().any(|needle| content.contains(needle)) {
            det.register(rule.target, rule.label);
        }
    }
}

/// 计算相对项目根目录的路径（正斜杠分隔）
fn relative_path(root: &Path, path: &Path) -> String {
    path.strip_prefix(root)
        .unwrap_or(path)
        .to_string_lossy()
        .replace('\\', "/")
}

/// 由框架集合推导项目类型标签（固定优先级，首个命中生效）
///
/// React > Vue.js > Angular > Svelte > jQuery，均未命中为 Vanilla JavaScript。
/// React/Vue 进一步区分同栈的 SSR 元框架。
pub fn classify_project_type(frameworks: &[String]) -> String {
    let has = |name: &str| frameworks.iter().any(|f| f == name);

    if has("React") {
        if has("Next.js") {
            "Next.js (React SSR)".to_string()
        } else {
            "React SPA".to_string()
        }
    } else if has("Vue.js") {
        if has("Nuxt.js") {
            "Nuxt.js (Vue SSR)".to_string()
        } else {
            "Vue SPA".to_string()
        }
    } else if has("Angular") {
        "Angular SPA".to_string()
    } else if has("Svelte") {
        "Svelte App".to_string()
    } else if has("jQuery") {
        "jQuery Application".to_string()
    } else {
        "Vanilla JavaScript".to_string()
    }
}
