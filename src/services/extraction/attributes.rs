//! 属性发现
//!
//! 每个句子只访问一次，各维度有自己的句子门槛：
//! 软件看 "simul"，水模型看水/溶剂关键词，力场看 "force field"，
//! 方法、温度、离子不设门槛。时长只做门槛判断，归一化交给外部协作方。

use std::collections::HashSet;

use regex::Regex;

use crate::error::AppResult;
use crate::models::{AttributeKind, AttributeObservation, Vocabulary, WaterModel, WaterModelType};

use super::sentences::Sentence;

/// 词表项 + 编译后的匹配模式
#[derive(Debug)]
struct NamedPattern {
    name: String,
    regex: Regex,
}

impl NamedPattern {
    fn new(name: &str, pattern: &str) -> AppResult<Self> {
        Ok(Self {
            name: name.to_string(),
            regex: Regex::new(pattern)?,
        })
    }
}

/// 宽松拼写：字母/数字交界、空格、连字符处允许可选的空白或连字符
///
/// `TIP3P` 可匹配 `TIP3P`、`TIP-3P`、`tip 3p`
pub fn flexible_pattern(name: &str) -> String {
    let mut out = String::from("(?i)");
    let mut prev: Option<char> = None;
    let mut pending_separator = false;

    for c in name.chars() {
        if c.is_whitespace() || c == '-' {
            pending_separator = true;
            continue;
        }
        let transition = prev.is_some_and(|p| {
            (p.is_alphabetic() && c.is_ascii_digit()) || (p.is_ascii_digit() && c.is_alphabetic())
        });
        if (pending_separator && prev.is_some()) || transition {
            out.push_str(r"[\s\-]?");
        }
        pending_separator = false;
        out.push_str(&regex::escape(&c.to_string()));
        prev = Some(c);
    }
    out
}

fn by_length_desc(names: &[String]) -> Vec<&String> {
    let mut sorted: Vec<&String> = names.iter().collect();
    sorted.sort_by_key(|name| std::cmp::Reverse(name.chars().count()));
    sorted
}

/// 运行期只读的已编译词表
#[derive(Debug)]
pub struct CompiledVocabulary {
    software: Vec<NamedPattern>,
    water: Vec<(NamedPattern, WaterModelType)>,
    force_fields: Vec<NamedPattern>,
    methods: Vec<NamedPattern>,
    ions: Vec<NamedPattern>,
}

impl CompiledVocabulary {
    /// 编译词表
    ///
    /// 水模型：显式在前、隐式在后，各自按名称长度降序；离子按长度降序。
    pub fn compile(vocabulary: &Vocabulary) -> AppResult<Self> {
        let vocabulary = vocabulary.clone().normalized();

        let software = vocabulary
            .software
            .iter()
            .map(|name| NamedPattern::new(name, &format!("(?i){}", regex::escape(name))))
            .collect::<AppResult<Vec<_>>>()?;

        let mut water = Vec::new();
        for (names, kind) in [
            (&vocabulary.explicit_water_models, WaterModelType::Explicit),
            (&vocabulary.implicit_water_models, WaterModelType::Implicit),
        ] {
            for name in by_length_desc(names) {
                water.push((NamedPattern::new(name, &flexible_pattern(name))?, kind));
            }
        }

        let force_fields = vocabulary
            .force_fields
            .iter()
            .map(|name| NamedPattern::new(name, &flexible_pattern(name)))
            .collect::<AppResult<Vec<_>>>()?;

        let methods = vocabulary
            .simulation_methods
            .iter()
            .map(|name| NamedPattern::new(name, &format!("(?i){}", regex::escape(name))))
            .collect::<AppResult<Vec<_>>>()?;

        // 短离子名（K+、Na+）区分大小写
        let ions = by_length_desc(&vocabulary.ions)
            .into_iter()
            .map(|name| {
                let escaped = regex::escape(name);
                let pattern = if name.chars().count() > 3 {
                    format!("(?i){}", escaped)
                } else {
                    escaped
                };
                NamedPattern::new(name, &pattern)
            })
            .collect::<AppResult<Vec<_>>>()?;

        Ok(Self {
            software,
            water,
            force_fields,
            methods,
            ions,
        })
    }
}

fn char_before(text: &str, at: usize) -> Option<char> {
    text[..at].chars().next_back()
}

fn char_after(text: &str, at: usize) -> Option<char> {
    text[at..].chars().next()
}

fn is_alnum(c: Option<char>) -> bool {
    c.is_some_and(|c| c.is_alphanumeric())
}

fn is_letter(c: Option<char>) -> bool {
    c.is_some_and(|c| c.is_alphabetic())
}

fn overlaps(spans: &[(usize, usize)], start: usize, end: usize) -> bool {
    spans.iter().any(|&(s, e)| start < e && s < end)
}

/// 截取前 `chars` 个字符
fn window(text: &str, chars: usize) -> &str {
    match text.char_indices().nth(chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

/// 把浓度换算为 mM
///
/// # 参数
/// - `value`: 数值
/// - `prefix`: SI 前缀（µ/μ/u、m、n、p），`None` 表示 M
pub fn to_millimolar(value: f64, prefix: Option<&str>) -> f64 {
    match prefix {
        None => value * 1000.0,
        Some("m") => value,
        Some("µ") | Some("μ") | Some("u") => value / 1000.0,
        Some("n") => value / 1_000_000.0,
        Some("p") => value / 1_000_000_000.0,
        Some(_) => value,
    }
}

/// 句中的浓度记号
#[derive(Debug, Clone)]
struct ConcentrationToken {
    start: usize,
    end: usize,
    millimolar: f64,
    consumed: bool,
}

/// 句中的离子命中
#[derive(Debug, Clone)]
struct IonHit {
    name: String,
    start: usize,
    end: usize,
}

/// 两个区间之间的字符距离，重叠时为 0
fn char_gap(text: &str, a: (usize, usize), b: (usize, usize)) -> usize {
    if b.1 <= a.0 {
        text[b.1..a.0].chars().count()
    } else if a.1 <= b.0 {
        text[a.1..b.0].chars().count()
    } else {
        0
    }
}

pub struct AttributeMatcher {
    simulation_context: Regex,
    paren_version: Regex,
    attached_version: Regex,
    window_version: Regex,
    water_context: Regex,
    explicit_generic: Regex,
    implicit_generic: Regex,
    force_field_context: Regex,
    ff_attached: Regex,
    ff_paren: Regex,
    ff_spaced: Regex,
    temperature: Regex,
    figure: Regex,
    concentration: Regex,
    paren_group: Regex,
    duration_unit: Regex,
    duration_context: Regex,
}

impl AttributeMatcher {
    pub fn new() -> AppResult<Self> {
        Ok(Self {
            simulation_context: Regex::new(r"(?i)simul")?,
            paren_version: Regex::new(
                r"(?i)^\s*([(\[])\s*(?:version\s*|ver\.?\s*|v\.?\s*)?([0-9][0-9a-z.\-]*)\s*[)\]]",
            )?,
            attached_version: Regex::new(r"(?i)^[\s\-_]?(?:v\.?\s*)?(\d+(?:\.\d+)*[a-z]?)\b")?,
            window_version: Regex::new(r"(?i)\b(?:version|ver\.?|v\.?)\s*(\d+(?:\.\d+)*[a-z]?)\b")?,
            water_context: Regex::new(r"(?i)water|solvent|solvat|hydrat")?,
            explicit_generic: Regex::new(r"(?i)\bexplicit(?:ly)?[\s\-]+(?:solvent|water|solvat|hydrat)")?,
            implicit_generic: Regex::new(
                r"(?i)\bimplicit(?:ly)?[\s\-]+(?:solvent|water|solvat|hydrat)|\bcontinuum[\s\-]+solv",
            )?,
            force_field_context: Regex::new(r"(?i)force[\s\-]?fields?")?,
            ff_attached: Regex::new(r"^([0-9][0-9A-Za-z]*(?:-[0-9A-Za-z]+)*)")?,
            ff_paren: Regex::new(r"^\s*\(([^()]{1,20})\)")?,
            ff_spaced: Regex::new(r"^[\s\-]+([0-9A-Za-z]+(?:[.\-][0-9A-Za-z]+)*)")?,
            temperature: Regex::new(r"(\d+(?:\.\d+)?)\s*K")?,
            figure: Regex::new(r"(?i)\bfig(?:ure)?s?\.?\s*\d")?,
            concentration: Regex::new(r"(\d+(?:\.\d+)?)\s*(µ|μ|u|m|n|p)?M")?,
            paren_group: Regex::new(r"\(([^()]*)\)")?,
            duration_unit: Regex::new(r"(?i)\d\s*ns\b|nanosecond")?,
            duration_context: Regex::new(r"(?i)simulat|production|trajector|\brun|\bmd\b")?,
        })
    }

    /// 句子级观测（时长除外）
    pub fn observe(&self, sentence: &Sentence<'_>, vocabulary: &CompiledVocabulary) -> Vec<AttributeObservation> {
        let text = sentence.text;
        let mut kinds = Vec::new();

        for (name, version) in self.software(text, vocabulary) {
            kinds.push(AttributeKind::Software { name, version });
        }
        kinds.extend(self.water_models(text, vocabulary).into_iter().map(AttributeKind::Water));
        kinds.extend(self.force_fields(text, vocabulary).into_iter().map(AttributeKind::ForceField));
        kinds.extend(self.methods(text, vocabulary).into_iter().map(AttributeKind::Method));
        kinds.extend(self.temperatures(text).into_iter().map(AttributeKind::Temperature));
        for (name, concentration_mm) in self.ions(text, vocabulary) {
            kinds.push(AttributeKind::Ion { name, concentration_mm });
        }

        kinds
            .into_iter()
            .map(|kind| AttributeObservation {
                kind,
                sentence_offset: sentence.offset,
            })
            .collect()
    }

    /// 是否需要把句子交给时长归一化
    pub fn wants_duration(&self, text: &str) -> bool {
        self.duration_unit.is_match(text) && self.duration_context.is_match(text)
    }

    fn software(&self, text: &str, vocabulary: &CompiledVocabulary) -> Vec<(String, Option<String>)> {
        if !self.simulation_context.is_match(text) {
            return Vec::new();
        }

        let mut found = Vec::new();
        for pattern in &vocabulary.software {
            for m in pattern.regex.find_iter(text) {
                if is_alnum(char_before(text, m.start())) || is_letter(char_after(text, m.end())) {
                    continue;
                }
                let entry = (pattern.name.clone(), self.software_version(&text[m.end()..]));
                if !found.contains(&entry) {
                    found.push(entry);
                }
            }
        }
        found
    }

    fn software_version(&self, rest: &str) -> Option<String> {
        if let Some(caps) = self.paren_version.captures(rest) {
            let version = caps[2].to_string();
            // [12] 这类是引用标记
            if &caps[1] == "[" && version.chars().all(|c| c.is_ascii_digit()) {
                return None;
            }
            return Some(version);
        }
        if let Some(caps) = self.attached_version.captures(rest) {
            return Some(caps[1].to_string());
        }
        self.window_version
            .captures(window(rest, 30))
            .map(|caps| caps[1].to_string())
    }

    fn water_models(&self, text: &str, vocabulary: &CompiledVocabulary) -> Vec<WaterModel> {
        if !self.water_context.is_match(text) {
            return Vec::new();
        }

        let mut masked: Vec<(usize, usize)> = Vec::new();
        let mut found = Vec::new();
        for (pattern, kind) in &vocabulary.water {
            for m in pattern.regex.find_iter(text) {
                if is_alnum(char_before(text, m.start()))
                    || is_alnum(char_after(text, m.end()))
                    || overlaps(&masked, m.start(), m.end())
                {
                    continue;
                }
                masked.push((m.start(), m.end()));
                let model = WaterModel {
                    name: Some(pattern.name.clone()),
                    kind: *kind,
                };
                if !found.contains(&model) {
                    found.push(model);
                }
            }
        }

        if found.is_empty() {
            if self.explicit_generic.is_match(text) {
                found.push(WaterModel {
                    name: None,
                    kind: WaterModelType::Explicit,
                });
            }
            if self.implicit_generic.is_match(text) {
                found.push(WaterModel {
                    name: None,
                    kind: WaterModelType::Implicit,
                });
            }
        }
        found
    }

    fn force_fields(&self, text: &str, vocabulary: &CompiledVocabulary) -> Vec<String> {
        if !self.force_field_context.is_match(text) {
            return Vec::new();
        }

        let mut found: Vec<String> = Vec::new();
        let mut record = |value: String| {
            if !found.iter().any(|f| f.eq_ignore_ascii_case(&value)) {
                found.push(value);
            }
        };

        for pattern in &vocabulary.force_fields {
            for m in pattern.regex.find_iter(text) {
                if is_alnum(char_before(text, m.start())) {
                    continue;
                }
                let rest = &text[m.end()..];
                let after = char_after(text, m.end());
                let name = &pattern.name;

                if after.is_some_and(|c| c.is_ascii_digit()) {
                    if let Some(caps) = self.ff_attached.captures(rest) {
                        record(format!("{}{}", name, &caps[1]));
                    }
                } else if let Some(caps) = self.ff_paren.captures(rest) {
                    let fragment = caps[1].trim();
                    if fragment.chars().any(|c| c.is_ascii_digit()) {
                        record(format!("{} {}", name, fragment));
                    }
                } else if let Some(caps) = self.ff_spaced.captures(rest) {
                    let fragment = &caps[1];
                    if fragment.chars().any(|c| c.is_ascii_digit()) {
                        record(format!("{} {}", name, fragment));
                    }
                }

                if !is_letter(after) {
                    record(name.clone());
                }
            }
        }
        found
    }

    fn methods(&self, text: &str, vocabulary: &CompiledVocabulary) -> Vec<String> {
        let mut found = Vec::new();
        for pattern in &vocabulary.methods {
            let hit = pattern.regex.find_iter(text).any(|m| {
                !is_letter(char_before(text, m.start())) && !is_letter(char_after(text, m.end()))
            });
            if hit && !found.contains(&pattern.name) {
                found.push(pattern.name.clone());
            }
        }
        found
    }

    fn temperatures(&self, text: &str) -> Vec<f64> {
        let figures: Vec<(usize, usize)> = self
            .figure
            .find_iter(text)
            .map(|m| (m.start(), m.end() + 10))
            .collect();

        let mut found: Vec<f64> = Vec::new();
        for caps in self.temperature.captures_iter(text) {
            let Some(whole) = caps.get(0) else { continue };
            if is_letter(char_after(text, whole.end())) {
                continue;
            }
            let before = char_before(text, whole.start());
            if is_alnum(before) || before == Some('.') {
                continue;
            }
            if figures
                .iter()
                .any(|&(start, end)| whole.start() >= start && whole.start() <= end)
            {
                continue;
            }
            let Ok(value) = caps[1].parse::<f64>() else { continue };
            if value > 0.0 && value <= 1000.0 && !found.iter().any(|t| t.to_bits() == value.to_bits()) {
                found.push(value);
            }
        }
        found
    }

    fn concentrations(&self, text: &str) -> Vec<ConcentrationToken> {
        self.concentration
            .captures_iter(text)
            .filter_map(|caps| {
                let whole = caps.get(0)?;
                if is_letter(char_after(text, whole.end())) {
                    return None;
                }
                let before = char_before(text, whole.start());
                if is_alnum(before) || before == Some('.') {
                    return None;
                }
                let value = caps[1].parse::<f64>().ok()?;
                Some(ConcentrationToken {
                    start: whole.start(),
                    end: whole.end(),
                    millimolar: to_millimolar(value, caps.get(2).map(|m| m.as_str())),
                    consumed: false,
                })
            })
            .collect()
    }

    /// 在 `[from, to)` 内查找离子名，跳过与 `blocked` 或已命中区间重叠的位置
    fn find_ions(
        &self,
        text: &str,
        (from, to): (usize, usize),
        vocabulary: &CompiledVocabulary,
        blocked: &[(usize, usize)],
        skip_names: Option<&HashSet<String>>,
        hits: &mut Vec<IonHit>,
    ) {
        for pattern in &vocabulary.ions {
            if skip_names.is_some_and(|names| names.contains(&pattern.name)) {
                continue;
            }
            let starts_alnum = pattern.name.starts_with(|c: char| c.is_alphanumeric());
            let ends_alnum = pattern.name.ends_with(|c: char| c.is_alphanumeric());

            for m in pattern.regex.find_iter(&text[from..to]) {
                let (start, end) = (from + m.start(), from + m.end());
                if (starts_alnum && is_alnum(char_before(text, start)))
                    || (ends_alnum && is_alnum(char_after(text, end)))
                {
                    continue;
                }
                let taken: Vec<(usize, usize)> = hits.iter().map(|h| (h.start, h.end)).collect();
                if overlaps(blocked, start, end) || overlaps(&taken, start, end) {
                    continue;
                }
                hits.push(IonHit {
                    name: pattern.name.clone(),
                    start,
                    end,
                });
            }
        }
    }

    fn ions(&self, text: &str, vocabulary: &CompiledVocabulary) -> Vec<(String, Option<f64>)> {
        let mut concentrations = self.concentrations(text);
        let groups: Vec<(usize, usize)> = self
            .paren_group
            .captures_iter(text)
            .filter_map(|caps| caps.get(1))
            .map(|m| (m.start(), m.end()))
            .collect();

        let mut hits = Vec::new();

        // 括号内按逗号分段
        for &(group_start, group_end) in &groups {
            let mut part_start = group_start;
            for part in text[group_start..group_end].split(',') {
                let part_end = part_start + part.len();
                self.find_ions(text, (part_start, part_end), vocabulary, &[], None, &mut hits);
                part_start = part_end + 1;
            }
        }

        // 括号外
        let parenthesized: Vec<(usize, usize)> = groups
            .iter()
            .map(|&(s, e)| (s.saturating_sub(1), (e + 1).min(text.len())))
            .collect();
        self.find_ions(text, (0, text.len()), vocabulary, &parenthesized, None, &mut hits);

        // 兜底：尚未出现的离子名
        let seen: HashSet<String> = hits.iter().map(|h| h.name.clone()).collect();
        self.find_ions(text, (0, text.len()), vocabulary, &[], Some(&seen), &mut hits);

        let mut found: Vec<(String, Option<f64>)> = Vec::new();
        for hit in hits {
            let nearest = concentrations
                .iter_mut()
                .filter(|c| !c.consumed)
                .min_by_key(|c| char_gap(text, (hit.start, hit.end), (c.start, c.end)));
            let concentration = nearest.map(|c| {
                c.consumed = true;
                c.millimolar
            });
            let entry = (hit.name, concentration);
            if !found.contains(&entry) {
                found.push(entry);
            }
        }
        found
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::extraction::sentences::split_sentences;

    fn observe(text: &str) -> Vec<AttributeKind> {
        let matcher = AttributeMatcher::new().unwrap();
        let vocabulary = CompiledVocabulary::compile(&Vocabulary::builtin()).unwrap();
        split_sentences(text)
            .iter()
            .flat_map(|s| matcher.observe(s, &vocabulary))
            .map(|o| o.kind)
            .collect()
    }

    #[test]
    fn flexible_pattern_allows_separators() {
        let re = Regex::new(&flexible_pattern("TIP3P")).unwrap();
        assert!(re.is_match("tip-3p"));
        assert!(re.is_match("TIP 3P"));
        assert!(re.is_match("TIP3P"));
    }

    #[test]
    fn software_requires_simulation_context() {
        assert!(observe("GROMACS 2020.4 was installed.").is_empty());
        assert_eq!(
            observe("Simulations were performed with GROMACS 2020.4."),
            vec![AttributeKind::Software {
                name: "GROMACS".into(),
                version: Some("2020.4".into())
            }]
        );
    }

    #[test]
    fn software_versions_in_parentheses_and_windows() {
        let kinds = observe("We simulated with NAMD (v2.14) and with AMBER software version 18.");
        assert!(kinds.contains(&AttributeKind::Software {
            name: "NAMD".into(),
            version: Some("2.14".into())
        }));
        assert!(kinds.contains(&AttributeKind::Software {
            name: "AMBER".into(),
            version: Some("18".into())
        }));
    }

    #[test]
    fn citation_marker_is_not_a_version() {
        assert_eq!(
            observe("All simulations used OpenMM [12] on GPUs."),
            vec![AttributeKind::Software {
                name: "OpenMM".into(),
                version: None
            }]
        );
    }

    #[test]
    fn longer_water_models_mask_shorter_ones() {
        assert_eq!(
            observe("The protein was solvated in TIP4P-Ew water."),
            vec![AttributeKind::Water(WaterModel {
                name: Some("TIP4P-Ew".into()),
                kind: WaterModelType::Explicit
            })]
        );
    }

    #[test]
    fn generic_solvent_phrase_has_no_name() {
        assert_eq!(
            observe("The system was modelled in implicit solvent."),
            vec![AttributeKind::Water(WaterModel {
                name: None,
                kind: WaterModelType::Implicit
            })]
        );
    }

    #[test]
    fn force_field_variants_and_bare_name() {
        let kinds = observe("We used the CHARMM36m force field.");
        assert!(kinds.contains(&AttributeKind::ForceField("CHARMM36m".into())));
        assert!(kinds.contains(&AttributeKind::ForceField("CHARMM".into())));
        assert!(observe("CHARMM36m parameters were used.").is_empty());
    }

    #[test]
    fn methods_respect_letter_boundaries() {
        assert_eq!(
            observe("Metadynamics runs were analysed."),
            vec![AttributeKind::Method("metadynamics".into())]
        );
        assert!(observe("Hypermetadynamics is not a word.").is_empty());
    }

    #[test]
    fn temperature_skips_figure_references_and_kilojoules() {
        assert_eq!(observe("The system was held at 310 K."), vec![AttributeKind::Temperature(310.0)]);
        assert!(observe("As seen in Fig. 3K the peak shifts.").is_empty());
        assert!(observe("The barrier is 12 kJ per mole and 40 KJ total.").is_empty());
    }

    #[test]
    fn concentrations_normalize_to_millimolar() {
        assert_eq!(to_millimolar(5.0, Some("µ")), 0.005);
        assert_eq!(to_millimolar(2.0, None), 2000.0);
        assert_eq!(to_millimolar(150.0, Some("m")), 150.0);
        assert_eq!(to_millimolar(3.0, Some("n")), 0.000003);
    }

    #[test]
    fn ions_pair_with_nearest_concentration() {
        let kinds = observe("The box contained 150 mM NaCl and 10 mM KCl.");
        assert_eq!(
            kinds,
            vec![
                AttributeKind::Ion {
                    name: "NaCl".into(),
                    concentration_mm: Some(150.0)
                },
                AttributeKind::Ion {
                    name: "KCl".into(),
                    concentration_mm: Some(10.0)
                },
            ]
        );
    }

    #[test]
    fn parenthesized_ion_groups_are_matched_first() {
        let kinds = observe("Ions were added (0.15 M NaCl, 5 µM Zn2+).");
        assert!(kinds.contains(&AttributeKind::Ion {
            name: "NaCl".into(),
            concentration_mm: Some(150.0)
        }));
        assert!(kinds.contains(&AttributeKind::Ion {
            name: "Zn2+".into(),
            concentration_mm: Some(0.005)
        }));
    }

    #[test]
    fn duration_gate_needs_unit_and_context() {
        let matcher = AttributeMatcher::new().unwrap();
        assert!(matcher.wants_duration("Each production run lasted 200 ns."));
        assert!(!matcher.wants_duration("Each production run lasted two days."));
        assert!(!matcher.wants_duration("The lifetime was 5 ns."));
    }
}
