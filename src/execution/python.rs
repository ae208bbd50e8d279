//! Interpreter-side source for the preamble, user units and the figure
//! introspection unit.

use crate::notebook::Cell;

/// MIME type of the structured figure record emitted by the introspection unit.
pub const FIGURES_MIME: &str = "application/vnd.nbexec.figures+json";
pub const FIGURES_VERSION: u32 = 1;

pub const CAPTURE_HELPER: &str = "_nbexec_capture_figures";
pub const CAPTURED_VAR: &str = "_nbexec_figures";

const PREAMBLE: &str = r#"import base64 as _nbexec_base64
import io as _nbexec_io

_nbexec_figures = []

try:
    import matplotlib as _nbexec_mpl
    _nbexec_mpl.use("Agg")
    import matplotlib.pyplot as _nbexec_plt
except ImportError:
    _nbexec_plt = None


def _nbexec_capture_figures():
    global _nbexec_figures
    images = []
    if _nbexec_plt is not None:
        for num in _nbexec_plt.get_fignums():
            buf = _nbexec_io.BytesIO()
            _nbexec_plt.figure(num).savefig(buf, format="png", bbox_inches="tight")
            images.append(_nbexec_base64.b64encode(buf.getvalue()).decode("ascii"))
        _nbexec_plt.close("all")
    _nbexec_figures = images
"#;

/// The hidden first unit of every session.
pub fn preamble_cell() -> Cell {
    Cell::code(PREAMBLE)
}

/// Source of user unit `count`: banner, snippet, capture call.
///
/// The capture call is the unit's last statement, so a bare trailing
/// expression in the snippet (`x` on its own line) produces no
/// `execute_result`; snippets show values with `print` or `display`.
pub fn unit_source(count: u64, snippet: &str) -> String {
    format!(
        "# Execution count: {count}\n{snippet}\n{CAPTURE_HELPER}()\n",
        snippet = snippet.trim_end()
    )
}

pub fn unit_cell(count: u64, snippet: &str) -> Cell {
    Cell::code(unit_source(count, snippet))
}

/// Emits the last captured figures as one typed display record. Falls back to
/// an empty list when the preamble never ran.
pub fn introspection_cell() -> Cell {
    Cell::code(format!(
        "from IPython.display import display as _nbexec_display\n\
         _nbexec_display({{\"{FIGURES_MIME}\": {{\"version\": {FIGURES_VERSION}, \
         \"images\": list(globals().get(\"{CAPTURED_VAR}\", []))}}}}, raw=True)\n"
    ))
}
