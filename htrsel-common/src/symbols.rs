//! Symbol conversion for transcriptions

use crate::config::SymbolPair;

/// Apply each replacement in table order
pub fn convert_symbols(text: &str, table: &[SymbolPair]) -> String {
    table
        .iter()
        .filter(|pair| !pair.from.is_empty())
        .fold(text.to_string(), |acc, pair| acc.replace(&pair.from, &pair.to))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TomlConfig;

    #[test]
    fn default_table_converts_rtl_arrows() {
        let table = TomlConfig::default().symbols;
        assert_eq!(convert_symbols("a -> b >- c", &table), "a ← b → c");
        assert_eq!(convert_symbols("plain", &table), "plain");
    }

    #[test]
    fn replacements_apply_in_order() {
        let table = vec![
            SymbolPair {
                from: "ab".to_string(),
                to: "b".to_string(),
            },
            SymbolPair {
                from: "bb".to_string(),
                to: "X".to_string(),
            },
        ];
        assert_eq!(convert_symbols("abb", &table), "X");
    }
}
