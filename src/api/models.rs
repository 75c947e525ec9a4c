#[derive(Debug, serde::Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct ContainerList {
    pub containers: Vec<String>,
}

impl ContainerList {
    pub fn new(mut containers: Vec<String>) -> Self {
        containers.sort();
        Self { containers }
    }
}
