use std::cell::Cell;
use std::rc::Rc;

use weave_core::{
    Callback, NodeId, RenderConfig, RenderError, Renderer, Skeleton, SkeletonBuilder, SkeletonError,
    Template, UnitId, Value,
};

struct Demo {
    renderer: Renderer,
    container: NodeId,
    root: UnitId,
    list: Rc<Skeleton>,
    row: Rc<Skeleton>,
    on_pick: Callback,
}

impl Demo {
    fn new(picks: Rc<Cell<usize>>) -> Result<Self, DemoError> {
        let mut renderer = Renderer::new(RenderConfig::from_env());
        let container = renderer.tree_mut().create_element("main");
        let root = renderer.mount(container)?;
        let list = Rc::new(
            SkeletonBuilder::new()
                .open("ul")
                .attribute("class", "fruits")
                .content()
                .close()
                .build()?,
        );
        let row = Rc::new(
            SkeletonBuilder::new()
                .open("li")
                .event("click")
                .content()
                .close()
                .build()?,
        );
        let on_pick = Callback::new(move |args, event| {
            picks.set(picks.get() + 1);
            log::info!("picked {:?} via node {}", args, event.current_target);
        });
        Ok(Self {
            renderer,
            container,
            root,
            list,
            row,
            on_pick,
        })
    }

    fn show(&mut self, fruits: &[&str]) -> Result<(), RenderError> {
        let rows = fruits.iter().map(|fruit| {
            Value::Template(Template::new(
                Rc::clone(&self.row),
                vec![self.on_pick.bind([Value::from(*fruit)]).into(), Value::from(*fruit)],
            ))
        });
        let value = Value::Template(Template::new(
            Rc::clone(&self.list),
            vec![Value::list(rows)],
        ));

        let before = self.renderer.tree().stats();
        self.renderer.render(self.root, value)?;
        let pass = self.renderer.tree().stats().since(&before);
        println!(
            "{fruits:?}: created {} inserted {} moved {} removed {} cleared {}",
            pass.created, pass.inserted, pass.moved, pass.removed, pass.cleared
        );
        Ok(())
    }

    fn click_first_row(&self) -> bool {
        let tree = self.renderer.tree();
        let Some(ul) = tree
            .children(self.container)
            .into_iter()
            .find(|node| tree.tag(*node) == Some("ul"))
        else {
            return false;
        };
        match tree.children(ul).into_iter().find(|node| tree.tag(*node) == Some("li")) {
            Some(li) => self.renderer.dispatch_event(li, "click", Value::Null),
            None => false,
        }
    }

    fn dump(&self) -> String {
        self.renderer.tree().dump_tree(Some(self.container))
    }
}

#[derive(Debug, thiserror::Error)]
enum DemoError {
    #[error(transparent)]
    Render(#[from] RenderError),
    #[error(transparent)]
    Skeleton(#[from] SkeletonError),
}

fn run() -> Result<(), DemoError> {
    let picks = Rc::new(Cell::new(0));
    let mut demo = Demo::new(Rc::clone(&picks))?;

    println!("=== Weave reconciliation demo ===");
    demo.show(&["Apple", "Banana"])?;
    demo.show(&["Banana", "Apple"])?;
    demo.show(&[])?;
    demo.show(&["Apple", "Banana", "Cherry"])?;
    print!("{}", demo.dump());

    demo.click_first_row();
    println!("clicks delivered: {}", picks.get());
    Ok(())
}

fn main() {
    env_logger::init();

    if let Err(err) = run() {
        log::error!("demo failed: {err}");
        std::process::exit(1);
    }
}
