use serde::{Deserialize, Serialize};

/// 抽取用词表，每次流水线运行从存储加载一次，运行期间只读
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Vocabulary {
    pub software: Vec<String>,
    pub explicit_water_models: Vec<String>,
    pub implicit_water_models: Vec<String>,
    pub force_fields: Vec<String>,
    pub simulation_methods: Vec<String>,
    pub ions: Vec<String>,
}

impl Vocabulary {
    /// 内置词表
    pub fn builtin() -> Self {
        fn owned(items: &[&str]) -> Vec<String> {
            items.iter().map(|s| s.to_string()).collect()
        }

        Self {
            software: owned(&[
                "GROMACS", "AMBER", "NAMD", "CHARMM", "OpenMM", "LAMMPS", "Desmond", "ACEMD",
                "GENESIS", "Tinker",
            ]),
            explicit_water_models: owned(&[
                "TIP3P", "TIP4P", "TIP4P-Ew", "TIP4P/2005", "TIP5P", "SPC", "SPC/E", "OPC",
            ]),
            implicit_water_models: owned(&["GBSA", "Generalized Born", "GBn2", "PBSA"]),
            force_fields: owned(&[
                "AMBER", "CHARMM", "OPLS-AA", "GROMOS", "ff14SB", "ff99SB-ILDN", "ff19SB",
                "CHARMM36m", "Martini",
            ]),
            simulation_methods: owned(&[
                "molecular dynamics",
                "replica exchange",
                "metadynamics",
                "umbrella sampling",
                "steered molecular dynamics",
                "free energy perturbation",
                "accelerated molecular dynamics",
                "coarse-grained",
            ]),
            ions: owned(&[
                "NaCl", "KCl", "MgCl2", "CaCl2", "Na+", "K+", "Cl-", "Mg2+", "Ca2+", "Zn2+",
                "sodium chloride", "potassium chloride",
            ]),
        }
    }

    /// 去除空白项与重复项（不区分大小写）
    pub fn normalized(mut self) -> Self {
        for list in [
            &mut self.software,
            &mut self.explicit_water_models,
            &mut self.implicit_water_models,
            &mut self.force_fields,
            &mut self.simulation_methods,
            &mut self.ions,
        ] {
            let mut seen = std::collections::HashSet::new();
            list.retain(|item| {
                let key = item.trim().to_lowercase();
                !key.is_empty() && seen.insert(key)
            });
            for item in list.iter_mut() {
                *item = item.trim().to_string();
            }
        }
        self
    }
}
