//! The single mount point owned by the render adapter.

use crate::error::SurfaceError;
use crate::executor::MountId;
use crate::ui::{render_html, UiNode};
use uuid::Uuid;

/// What is currently visible.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum View {
    /// A tree rendered by the in-process engine; `mount` is its live root.
    Native { mount: MountId, nodes: Vec<UiNode> },
    /// A document populated by an isolated session.
    Isolated {
        session: Uuid,
        populated: bool,
        document: String,
    },
}

impl View {
    pub fn html(&self) -> String {
        match self {
            View::Native { nodes, .. } => render_html(nodes),
            View::Isolated { document, .. } => document.clone(),
        }
    }
}

/// A view plus the render request that produced it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mounted {
    pub request: u64,
    pub view: View,
}

#[derive(Debug, Default)]
pub struct Surface {
    current: Option<Mounted>,
    mounts: u64,
}

impl Surface {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mount `view` for `request`. Refuses to overlap an existing view.
    pub fn mount(&mut self, request: u64, view: View) -> Result<(), SurfaceError> {
        if let Some(current) = &self.current {
            return Err(SurfaceError::Occupied {
                current: current.request,
            });
        }
        self.current = Some(Mounted { request, view });
        self.mounts += 1;
        Ok(())
    }

    pub fn unmount(&mut self) -> Option<Mounted> {
        self.current.take()
    }

    pub fn current(&self) -> Option<&Mounted> {
        self.current.as_ref()
    }

    pub fn is_empty(&self) -> bool {
        self.current.is_none()
    }

    /// Total successful mounts over the surface's lifetime.
    pub fn mount_count(&self) -> u64 {
        self.mounts
    }

    /// Markup of the current view, empty when nothing is mounted.
    pub fn html(&self) -> String {
        self.current
            .as_ref()
            .map(|mounted| mounted.view.html())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn native(text: &str) -> View {
        View::Native {
            mount: 1,
            nodes: vec![UiNode::element("p", &[], vec![UiNode::text(text)])],
        }
    }

    #[test]
    fn mount_is_exclusive() {
        let mut surface = Surface::new();
        surface.mount(1, native("first")).unwrap();
        let err = surface.mount(2, native("second")).unwrap_err();
        assert_eq!(err, SurfaceError::Occupied { current: 1 });
        assert_eq!(surface.html(), "<p>first</p>");

        let previous = surface.unmount().unwrap();
        assert_eq!(previous.request, 1);
        surface.mount(2, native("second")).unwrap();
        assert_eq!(surface.current().map(|m| m.request), Some(2));
        assert_eq!(surface.mount_count(), 2);
    }

    #[test]
    fn isolated_view_renders_its_document() {
        let mut surface = Surface::new();
        assert_eq!(surface.html(), "");
        surface
            .mount(
                3,
                View::Isolated {
                    session: Uuid::nil(),
                    populated: false,
                    document: "<!DOCTYPE html><p>panel</p>".into(),
                },
            )
            .unwrap();
        assert_eq!(surface.html(), "<!DOCTYPE html><p>panel</p>");
        assert!(!surface.is_empty());
    }
}
