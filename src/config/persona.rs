use log::info;
use serde::Deserialize;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::SystemTime;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PersonaError {
    #[error("persona file IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("persona JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("persona validation error: {0}")]
    Invalid(String),
}

/// Business persona injected ahead of every upstream conversation, plus the
/// widget-facing strings that belong to the same voice.
#[derive(Deserialize, Debug, Clone)]
pub struct PersonaConfig {
    pub system_prompt: String,
    pub welcome_message: String,
    #[serde(default)]
    pub preset_questions: Vec<String>,
    #[serde(skip)]
    pub last_loaded: Option<SystemTime>,
}

impl PersonaConfig {
    fn validate(&self) -> Result<(), PersonaError> {
        if self.system_prompt.trim().is_empty() {
            return Err(PersonaError::Invalid("system_prompt is empty".to_string()));
        }
        if self.welcome_message.trim().is_empty() {
            return Err(PersonaError::Invalid("welcome_message is empty".to_string()));
        }
        Ok(())
    }
}

/// Built-in persona used when no persona file is configured. Mirrors
/// `json/persona.json`.
pub fn default_persona() -> PersonaConfig {
    PersonaConfig {
        system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
        welcome_message: DEFAULT_WELCOME_MESSAGE.to_string(),
        preset_questions: DEFAULT_PRESET_QUESTIONS.iter().map(|q| q.to_string()).collect(),
        last_loaded: None,
    }
}

pub fn load_persona(path: &str) -> Result<Arc<PersonaConfig>, PersonaError> {
    let file_content = fs::read_to_string(path)?;
    let mut config: PersonaConfig = serde_json::from_str(&file_content)?;
    config.validate()?;
    config.last_loaded = Some(SystemTime::now());
    Ok(Arc::new(config))
}

/// Reload the persona file when its mtime moved past the loaded snapshot.
/// Returns `None` when the file is unchanged.
pub fn reload_persona_if_changed<P: AsRef<Path>>(
    path: P,
    current: &Arc<PersonaConfig>,
) -> Result<Option<Arc<PersonaConfig>>, PersonaError> {
    let metadata = fs::metadata(&path)?;

    let changed = match (metadata.modified().ok(), current.last_loaded) {
        (Some(modified), Some(last_loaded)) => modified > last_loaded,
        _ => true,
    };

    if !changed {
        return Ok(None);
    }

    info!("Persona file changed, reloading...");
    let path_str = path.as_ref().to_string_lossy();
    load_persona(&path_str).map(Some)
}

const DEFAULT_SYSTEM_PROMPT: &str = r#"# 角色：NeuraServe资深业务顾问（赵经理）
# 风格：专业、务实、有人情味、对话式

## 【我的定位】
我是你的业务顾问，不是机器人。我的目标不是推销，而是帮你找到最适合的方案。

## 【核心理念】
1. **AI不是替代人**，而是帮人做得更好。
2. **关键数据**：通常AI能处理70-80%的重复咨询，但复杂/情感化问题仍需人工。
3. **最佳模式**：AI处理常见问题 → 人工专注高价值沟通。
4. **真实价值**：不是裁员，而是让现有团队效率提升3-5倍。

## 【产品信息】
- 我们叫NeuraServe，做企业AI客服方案。
- 准确率行业领先（99.2%），响应<200ms。
- 价格透明：基础版¥9800/年，专业版¥29800/年（最受欢迎），定制方案看需求。
- 可以¥500试用7天，满意再升级。

## 【联系方式】
- 邮箱：1850859427@qq.com
- 微信：Jr_gyh（加我发案例资料）
- 电话：139-5203-6081（工作时间接）

## 【对话风格】
用自然对话方式，先理解客户具体需求，再给出个性化建议。不要一次性列出所有信息，而是根据客户问题逐步提供。"#;

const DEFAULT_WELCOME_MESSAGE: &str =
    "您好！我是NeuraServe的业务顾问赵经理，可以帮您分析AI客服方案，优化团队效率。有什么我可以帮您的？";

const DEFAULT_PRESET_QUESTIONS: [&str; 8] = [
    "我有15个客服，能省多少钱？",
    "人机协作的具体方案？",
    "真实能提升多少效率？",
    "实施周期要多久？",
    "有没有我们行业的案例？",
    "AI会不会很死板？",
    "如何开始试用？",
    "和赵经理详细聊聊？",
];

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn temp_persona_file(content: &str) -> std::path::PathBuf {
        let mut path = std::env::temp_dir();
        path.push(format!("persona-{}.json", uuid::Uuid::new_v4()));
        let mut file = fs::File::create(&path).unwrap();
        file.write_all(content.as_bytes()).unwrap();
        path
    }

    #[test]
    fn builtin_persona_is_complete() {
        let persona = default_persona();
        assert!(persona.system_prompt.contains("NeuraServe"));
        assert!(persona.welcome_message.contains("赵经理"));
        assert_eq!(persona.preset_questions.len(), 8);
    }

    #[test]
    fn loads_persona_from_file() {
        let path = temp_persona_file(
            r#"{"system_prompt":"你是测试助手","welcome_message":"你好"}"#
        );
        let persona = load_persona(path.to_str().unwrap()).unwrap();
        assert_eq!(persona.system_prompt, "你是测试助手");
        assert!(persona.preset_questions.is_empty());
        assert!(persona.last_loaded.is_some());
        fs::remove_file(path).ok();
    }

    #[test]
    fn rejects_blank_system_prompt() {
        let path = temp_persona_file(r#"{"system_prompt":"  ","welcome_message":"hi"}"#);
        assert!(matches!(
            load_persona(path.to_str().unwrap()),
            Err(PersonaError::Invalid(_))
        ));
        fs::remove_file(path).ok();
    }

    #[test]
    fn rejects_malformed_json() {
        let path = temp_persona_file("not json");
        assert!(matches!(
            load_persona(path.to_str().unwrap()),
            Err(PersonaError::Json(_))
        ));
        fs::remove_file(path).ok();
    }

    #[test]
    fn reload_is_noop_when_unchanged() {
        let path = temp_persona_file(
            r#"{"system_prompt":"你是测试助手","welcome_message":"你好"}"#
        );
        let persona = load_persona(path.to_str().unwrap()).unwrap();
        let reloaded = reload_persona_if_changed(&path, &persona).unwrap();
        assert!(reloaded.is_none());
        fs::remove_file(path).ok();
    }
}
