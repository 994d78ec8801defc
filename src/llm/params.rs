//! 请求参数构建

use serde_json::{Map, Number, Value};

use super::types::ParameterBag;

/// 采样参数
///
/// 全部可选，未设置的参数不会进入参数包，也不会被替换成任何默认值。
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SamplingParams {
    pub temperature: Option<f64>,
    pub max_tokens: Option<u32>,
    pub top_p: Option<f64>,
    pub frequency_penalty: Option<f64>,
    pub presence_penalty: Option<f64>,
}

/// 合并采样参数与透传参数
///
/// 先写入已设置的采样参数，再写入 extra；同名键以 extra 为准。
pub fn build_parameter_bag(sampling: &SamplingParams, extra: &Map<String, Value>) -> ParameterBag {
    // NaN / 无穷大无法表示为 JSON 数字，按未设置处理
    let float = |value: Option<f64>| value.and_then(Number::from_f64).map(Value::Number);

    let builtins = [
        ("temperature", float(sampling.temperature)),
        ("max_tokens", sampling.max_tokens.map(Value::from)),
        ("top_p", float(sampling.top_p)),
        ("frequency_penalty", float(sampling.frequency_penalty)),
        ("presence_penalty", float(sampling.presence_penalty)),
    ];

    let mut bag = ParameterBag::new();
    for (key, value) in builtins {
        if let Some(value) = value {
            bag.insert(key.to_string(), value);
        }
    }

    for (key, value) in extra {
        bag.insert(key.clone(), value.clone());
    }

    bag
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_unset_params_are_omitted() {
        let bag = build_parameter_bag(&SamplingParams::default(), &Map::new());
        assert!(bag.is_empty());
    }

    #[test]
    fn test_zero_is_kept() {
        let sampling = SamplingParams {
            temperature: Some(0.0),
            presence_penalty: Some(0.0),
            ..Default::default()
        };
        let bag = build_parameter_bag(&sampling, &Map::new());
        assert_eq!(bag.get("temperature"), Some(&json!(0.0)));
        assert_eq!(bag.get("presence_penalty"), Some(&json!(0.0)));
        assert!(!bag.contains_key("top_p"));
    }

    #[test]
    fn test_insertion_order() {
        let sampling = SamplingParams {
            temperature: Some(0.5),
            max_tokens: Some(64),
            top_p: Some(0.9),
            frequency_penalty: Some(0.1),
            presence_penalty: Some(0.2),
        };
        let mut extra = Map::new();
        extra.insert("seed".into(), json!(7));
        let bag = build_parameter_bag(&sampling, &extra);
        let keys: Vec<&str> = bag.keys().map(String::as_str).collect();
        assert_eq!(
            keys,
            vec!["temperature", "max_tokens", "top_p", "frequency_penalty", "presence_penalty", "seed"]
        );
        assert_eq!(bag["max_tokens"], json!(64));
    }

    #[test]
    fn test_extra_overrides_builtin() {
        let sampling = SamplingParams {
            temperature: Some(0.2),
            ..Default::default()
        };
        let mut extra = Map::new();
        extra.insert("temperature".into(), json!(0.9));
        let bag = build_parameter_bag(&sampling, &extra);
        assert_eq!(bag["temperature"], json!(0.9));
    }

    #[test]
    fn test_extra_values_are_not_coerced() {
        let mut extra = Map::new();
        extra.insert("max_tokens".into(), json!("lots"));
        let bag = build_parameter_bag(&SamplingParams::default(), &extra);
        assert_eq!(bag["max_tokens"], json!("lots"));
    }
}
