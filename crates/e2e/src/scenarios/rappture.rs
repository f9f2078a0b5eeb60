//! The Rappture C and Python APIs inside a container
//!
//! Every check writes a small tool.xml and a program into `$SESSIONDIR`,
//! loads the rappture environment selected with `--rappture_version` and
//! runs the program against the xml file.

use async_trait::async_trait;
use tracing::debug;

use crate::error::{E2eError, E2eResult};
use crate::runner::{Scenario, TestContext};
use crate::scenarios::{SessionShell, REGISTERED_ROLE};

pub const TOOL_XML: &str = r##"<?xml version="1.0"?>
<run>
    <tool>
        <about>Press Simulate to view results.</about>
        <command>@tool/fermi @driver</command>
    </tool>
    <input>
        <number id="Ef">
            <about>
                <label>Fermi Level</label>
                <description>Energy at center of distribution.</description>
            </about>
            <units>eV</units>
            <min>-10eV</min>
            <max>10eV</max>
            <default>0.2556eV</default>
        </number>
    </input>
</run>
"##;

/// Status of a program killed by SIGSEGV, as the shell reports it
const SEGFAULT: i32 = 139;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Api {
    C,
    Python,
}

impl Api {
    fn source_name(&self) -> &'static str {
        match self {
            Api::C => "program.c",
            Api::Python => "program.py",
        }
    }

    fn class(&self) -> &'static str {
        match self {
            Api::C => "TestContainerRapptureCApi",
            Api::Python => "TestContainerRappturePythonApi",
        }
    }

    fn tag(&self) -> &'static str {
        match self {
            Api::C => "rappture_c",
            Api::Python => "rappture_python",
        }
    }
}

/// Commands that prepare and then run a program in `dir`
///
/// All but the last must succeed; the last one's status and output are
/// what the check looks at.
pub fn program_commands(api: Api, rappture_env: &str, dir: &str, xml: &str) -> Vec<String> {
    let source = format!("{}/{}", dir, api.source_name());
    let mut commands = vec![
        ". /etc/environ.sh".to_string(),
        format!("use -e -r {}", rappture_env),
    ];
    match api {
        Api::C => {
            let binary = format!("{}/program", dir);
            commands.push(format!(
                "gcc -o {} -I$RAPPTURE_PATH/include {} -L$RAPPTURE_PATH/lib -lrappture -lexpat -lz -lm",
                binary, source
            ));
            commands.push(format!("chmod 700 {}", binary));
            commands.push(format!("{} {}", binary, xml));
        }
        Api::Python => commands.push(format!("python {} {} 2>&1", source, xml)),
    }
    commands
}

/// What a program run has to produce
#[derive(Debug, Clone, Copy)]
enum Expect {
    Status(i32),
    /// Status 0 and exactly this output
    Prints(&'static str),
    /// This status and output mentioning the text
    Fails(i32, &'static str),
}

/// One API call checked through a small program
pub struct RappturePrograms {
    name: &'static str,
    api: Api,
    program: &'static str,
    expect: Expect,
}

pub fn scenarios() -> Vec<Box<dyn Scenario>> {
    let c = |name: &'static str, program: &'static str, expect: Expect| {
        Box::new(RappturePrograms {
            name,
            api: Api::C,
            program,
            expect,
        }) as Box<dyn Scenario>
    };
    let py = |name: &'static str, program: &'static str, expect: Expect| {
        Box::new(RappturePrograms {
            name,
            api: Api::Python,
            program,
            expect,
        }) as Box<dyn Scenario>
    };
    vec![
        c("test_rpLibrary_valid_path", C_LIBRARY, Expect::Status(0)),
        c("test_rpLibrary_null_path", C_LIBRARY_NULL, Expect::Status(0)),
        c("test_rpGetString_valid_path", C_GET_STRING, Expect::Prints("Fermi Level")),
        c("test_rpGetString_null_retcstr", C_GET_STRING_NULL, Expect::Status(SEGFAULT)),
        c("test_rpGetDouble_valid_path", C_GET_DOUBLE, Expect::Prints("0.2556")),
        c("test_rpGetDouble_null_retdval", C_GET_DOUBLE_NULL, Expect::Status(SEGFAULT)),
        c("test_rpPutString_valid_path_valid_value", C_PUT_STRING, Expect::Prints("my new data")),
        py("test_library_valid_path", PY_LIBRARY, Expect::Status(0)),
        py("test_library_none_path", PY_LIBRARY_NONE, Expect::Fails(1, "")),
        py("test_get_valid_path", PY_GET, Expect::Prints("Fermi Level")),
        py("test_get_none_path", PY_GET_NONE, Expect::Fails(1, "TypeError")),
        py("test_put_valid_path_valid_value", PY_PUT, Expect::Prints("my new data")),
    ]
}

#[async_trait]
impl Scenario for RappturePrograms {
    fn name(&self) -> &str {
        self.name
    }

    fn class(&self) -> &str {
        self.api.class()
    }

    fn tags(&self) -> &[&str] {
        match self.api {
            Api::C => &["container", "rappture", "rappture_c"],
            Api::Python => &["container", "rappture", "rappture_python"],
        }
    }

    async fn run(&self, ctx: &mut TestContext) -> E2eResult<()> {
        let rappture_env = ctx.class().rappture_env().to_string();
        let mut shell = SessionShell::open(ctx.hub(), REGISTERED_ROLE, None).await?;
        let result = async {
            shell.put("tool.xml", TOOL_XML, Some(0o600)).await?;
            shell.put(self.api.source_name(), self.program, Some(0o600)).await?;
            if self.api == Api::C {
                let binary = shell.path("program");
                shell.remove_on_finish(binary);
            }

            let mut commands =
                program_commands(self.api, &rappture_env, &shell.sessiondir, "tool.xml");
            let run = commands.pop().unwrap_or_default();
            shell.ws.execute_all(&commands).await?;
            let (output, status) = shell.ws.execute_unchecked(&run).await?;
            let output = output.trim();
            debug!("{} ({}) exited {}: {}", self.name, self.api.tag(), status, output);

            match self.expect {
                Expect::Status(expected) => E2eError::check(status == expected, || {
                    format!("program exited with status {}, expected {}: {}", status, expected, output)
                }),
                Expect::Prints(expected) => {
                    E2eError::check(status == 0, || {
                        format!("program exited with status {}: {}", status, output)
                    })?;
                    E2eError::check(output == expected, || {
                        format!("expected output '{}', received '{}'", expected, output)
                    })
                }
                Expect::Fails(expected, text) => {
                    E2eError::check(status == expected, || {
                        format!("program exited with status {}, expected {}", status, expected)
                    })?;
                    E2eError::check(output.contains(text), || {
                        format!("program did not report {}: {}", text, output)
                    })
                }
            }
        }
        .await;
        shell.finish(result).await
    }
}

const C_LIBRARY: &str = r##"#include <stdio.h>
#include "rappture.h"

int main(int argc, char* argv[]) {
    RpLibrary* lib = rpLibrary(argv[1]);
    return lib == NULL ? 1 : 0;
}
"##;

const C_LIBRARY_NULL: &str = r##"#include <stdio.h>
#include "rappture.h"

int main(int argc, char* argv[]) {
    RpLibrary* lib = rpLibrary(NULL);
    return lib == NULL ? 1 : 0;
}
"##;

const C_GET_STRING: &str = r##"#include <stdio.h>
#include "rappture.h"

int main(int argc, char* argv[]) {
    const char* val = NULL;
    RpLibrary* lib = rpLibrary(argv[1]);
    if (lib == NULL) {
        return 1;
    }
    int err = rpGetString(lib, "input.number(Ef).about.label", &val);
    printf("%s", val);
    return err;
}
"##;

const C_GET_STRING_NULL: &str = r##"#include <stdio.h>
#include "rappture.h"

int main(int argc, char* argv[]) {
    RpLibrary* lib = rpLibrary(argv[1]);
    if (lib == NULL) {
        return 1;
    }
    return rpGetString(lib, "input.number(Ef).about.label", NULL);
}
"##;

const C_GET_DOUBLE: &str = r##"#include <stdio.h>
#include "rappture.h"

int main(int argc, char* argv[]) {
    double val = 0.0;
    RpLibrary* lib = rpLibrary(argv[1]);
    if (lib == NULL) {
        return 1;
    }
    int err = rpGetDouble(lib, "input.number(Ef).default", &val);
    printf("%g", val);
    return err;
}
"##;

const C_GET_DOUBLE_NULL: &str = r##"#include <stdio.h>
#include "rappture.h"

int main(int argc, char* argv[]) {
    RpLibrary* lib = rpLibrary(argv[1]);
    if (lib == NULL) {
        return 1;
    }
    return rpGetDouble(lib, "input.number(Ef).default", NULL);
}
"##;

const C_PUT_STRING: &str = r##"#include <stdio.h>
#include "rappture.h"

int main(int argc, char* argv[]) {
    const char* path = "output.string.current";
    const char* rvalue = NULL;
    RpLibrary* lib = rpLibrary(argv[1]);
    if (lib == NULL) {
        return 1;
    }
    int err = rpPutString(lib, path, "my new data", 0);
    rpGetString(lib, path, &rvalue);
    printf("%s", rvalue);
    return err;
}
"##;

const PY_LIBRARY: &str = r##"import sys
import Rappture

lib = Rappture.library(sys.argv[1])
if lib is None:
    raise Exception("failed to open xml file: %s" % sys.argv[1])
sys.exit()
"##;

const PY_LIBRARY_NONE: &str = r##"import sys
import Rappture

lib = Rappture.library(None)
sys.exit()
"##;

const PY_GET: &str = r##"import sys
import Rappture

lib = Rappture.library(sys.argv[1])
if lib is None:
    raise Exception("failed to open xml file: %s" % sys.argv[1])
sys.stdout.write("%s\n" % lib.get('input.number(Ef).about.label'))
sys.exit()
"##;

const PY_GET_NONE: &str = r##"import sys
import Rappture

lib = Rappture.library(sys.argv[1])
if lib is None:
    raise Exception("failed to open xml file: %s" % sys.argv[1])
lib.get(None)
sys.exit()
"##;

const PY_PUT: &str = r##"import sys
import Rappture

lib = Rappture.library(sys.argv[1])
if lib is None:
    raise Exception("failed to open xml file: %s" % sys.argv[1])
lib.put('output.string.current', 'my new data')
sys.stdout.write("%s\n" % lib.get('output.string.current'))
sys.exit()
"##;
