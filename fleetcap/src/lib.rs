pub mod target;
pub mod state;
pub mod orchestration;
pub mod discovery;
pub mod remote;
pub mod storage;
pub mod analysis_tools;
pub mod aws;

#[cfg(test)]
pub(crate) mod test_support;

#[macro_export]
macro_rules! vec_of_strings {
    ($($x:expr),* $(,)?) => (vec![$($x.to_string()),*]);
}

/// Replace characters that are awkward in folder names with "-"
pub fn format_path_component(s: &str) -> String {
    let formatted = s.replace(&['(', ')', ',', '\"', '.', ';', ':', '\'', ' ', '/', '\\'][..], "-");
    if formatted.is_empty() {
        "unnamed".to_string()
    } else {
        formatted
    }
}
