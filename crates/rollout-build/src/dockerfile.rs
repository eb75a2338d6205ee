use rollout_core::{BuildConfig, ProjectMeta};

/// Where the release binary lands in the runtime image.
const RUNTIME_BINARY: &str = "/usr/local/bin/app";

/// Renders a cargo-chef Dockerfile for a Cargo package that ships none.
///
/// Four stages: `chef` installs cargo-chef, `planner` computes the dependency
/// recipe, `builder` cooks dependencies then compiles the binary, and the
/// final stage copies only the binary onto the runtime image.
pub struct DockerfileGenerator<'a> {
    config: &'a BuildConfig,
    meta: &'a ProjectMeta,
    port: u16,
}

impl<'a> DockerfileGenerator<'a> {
    pub fn new(config: &'a BuildConfig, meta: &'a ProjectMeta, port: u16) -> Self {
        Self { config, meta, port }
    }

    pub fn render(&self) -> String {
        let stages = [
            self.chef_stage(),
            self.planner_stage(),
            self.builder_stage(),
            self.runtime_stage(),
        ];
        format!(
            "# Generated by rollout for {} {}\n{}",
            self.meta.name,
            self.meta.version,
            stages.join("\n")
        )
    }

    fn chef_stage(&self) -> String {
        format!(
            "FROM {} AS chef\n\
             RUN cargo install cargo-chef --version {} --locked\n\
             WORKDIR /app\n",
            self.config.base_image, self.config.cargo_chef_version
        )
    }

    fn planner_stage(&self) -> String {
        "FROM chef AS planner\n\
         COPY . .\n\
         RUN cargo chef prepare --recipe-path recipe.json\n"
            .to_owned()
    }

    fn builder_stage(&self) -> String {
        let mut stage = String::from("FROM chef AS builder\n");
        if !self.config.extra_packages.is_empty() {
            stage.push_str(&format!(
                "RUN apt-get update && apt-get install -y {} && rm -rf /var/lib/apt/lists/*\n",
                self.config.extra_packages.join(" ")
            ));
        }
        stage.push_str(
            "COPY --from=planner /app/recipe.json recipe.json\n\
             RUN cargo chef cook --release --recipe-path recipe.json\n\
             COPY . .\n",
        );
        stage.push_str(&format!(
            "RUN cargo build --release --bin {}\n",
            self.meta.binary_name
        ));
        stage
    }

    fn runtime_stage(&self) -> String {
        format!(
            "FROM {runtime}\n\
             COPY --from=builder /app/target/release/{binary} {RUNTIME_BINARY}\n\
             ENV PORT={port}\n\
             EXPOSE {port}\n\
             CMD [\"{RUNTIME_BINARY}\"]\n",
            runtime = self.config.runtime_image,
            binary = self.meta.binary_name,
            port = self.port,
        )
    }
}
