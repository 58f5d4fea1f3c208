//! Static dependency libraries built with `configure`/`make`.

use super::{BuildContext, BuildStrategy, Variant};
use crate::error::Result;

/// Dependency libraries linked into Python.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Library {
    /// `libbz2.a`
    Bzip2,
    /// `libssl.a` and `libcrypto.a`
    OpenSsl,
    /// `liblzma.a`
    Xz,
}

/// Builds one [`Library`] into `build/lib/<name>`.
#[derive(Debug, Clone, Copy)]
pub struct Configured {
    library: Library,
}

impl Configured {
    /// Strategy for `library`.
    pub fn new(library: Library) -> Self {
        Self { library }
    }

    /// The library this strategy builds.
    pub fn library(&self) -> Library {
        self.library
    }
}

impl BuildStrategy for Configured {
    fn variant(&self) -> Variant {
        Variant::Configured
    }

    fn build(&self, ctx: &BuildContext<'_>) -> Result<()> {
        let prefix = ctx.paths.prefix.to_string_lossy().into_owned();
        match self.library {
            Library::Bzip2 => {
                ctx.run(
                    ctx.src_cmd("make")
                        .arg("install")
                        .arg(format!("PREFIX={prefix}")),
                )?;
            }
            Library::OpenSsl => {
                ctx.run(
                    ctx.src_cmd("./config")
                        .args(["no-shared", "no-tests"])
                        .arg(format!("--prefix={prefix}")),
                )?;
                ctx.run(ctx.src_cmd("make").arg("install_sw"))?;
            }
            Library::Xz => {
                ctx.run(
                    ctx.src_cmd("./configure")
                        .args(["--disable-shared", "--enable-static"])
                        .arg(format!("--prefix={prefix}")),
                )?;
                ctx.run(ctx.src_cmd("make"))?;
                ctx.run(ctx.src_cmd("make").arg("install"))?;
            }
        }
        Ok(())
    }
}
